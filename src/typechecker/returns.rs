//! Structured missing-return analysis.
//!
//! A statement "always returns" when every control path through it ends in
//! a `return`. Loops never count (they may run zero times), so coverage
//! comes from returns, fully-covered `if` chains, and switches with a
//! default branch.

use crate::parser::ast::{Block, Statement};

pub fn always_returns(statement: &Statement) -> bool {
    match statement {
        Statement::Return(_) => true,
        Statement::Block(block) => block_returns(block),
        Statement::If(if_statement) => {
            let Some(else_branch) = &if_statement.else_branch else {
                return false;
            };
            if_statement
                .branches
                .iter()
                .all(|(_, body)| block_returns(body))
                && block_returns(else_branch)
        }
        Statement::Switch(switch) => {
            let Some(else_branch) = &switch.else_branch else {
                return false;
            };
            switch.cases.iter().all(|case| block_returns(&case.body))
                && block_returns(else_branch)
        }
        _ => false,
    }
}

pub fn block_returns(block: &Block) -> bool {
    block.statements.iter().any(always_returns)
}

#[cfg(test)]
mod tests {
    use crate::typechecker::test_support::check_errors;

    #[test]
    fn test_plain_return_is_accepted() {
        assert!(check_errors("fun f() int64 { return 1; }").is_empty());
    }

    #[test]
    fn test_missing_return_is_reported() {
        let errors = check_errors("fun f() int64 { var x = 1; }");
        assert!(errors.iter().any(|e| e.contains("Missing return")), "{errors:?}");
    }

    #[test]
    fn test_if_needs_all_branches_to_return() {
        let errors = check_errors(
            "fun f(x int64) int64 { if x > 0 { return 1; } }",
        );
        assert!(errors.iter().any(|e| e.contains("Missing return")), "{errors:?}");

        assert!(check_errors(
            "fun f(x int64) int64 { if x > 0 { return 1; } else { return 2; } }",
        )
        .is_empty());
    }

    #[test]
    fn test_switch_with_default_covers() {
        assert!(check_errors(
            "fun f(x int64) int64 { switch x { case 0 -> return 1; else -> return 2; } }",
        )
        .is_empty());
    }

    #[test]
    fn test_void_function_needs_no_return() {
        assert!(check_errors("fun f() { var x = 1; }").is_empty());
    }
}

//! Line-coverage policy.
//!
//! Every instrumentable statement gets `CALL __record_coverage(...)`
//! immediately before it, tagged with the file line of the statement's
//! first token. Control-flow statements get a probe for their own head
//! line, and their bodies are instrumented in turn. `DECLARE`, `BEGIN` and
//! comments are never probed, so declarations stay at the top of their block.

use crate::ast::{Routine, Statement};
use crate::error::TransformError;

use super::{coverage_call, rewrite_lists, Instrumentation, RoutineContext, RoutineRewrite};

#[derive(Debug, Clone, Copy, Default)]
pub struct CoveragePolicy;

impl Instrumentation for CoveragePolicy {
    fn instrument(
        &self,
        mut routine: Routine,
        context: &RoutineContext<'_>,
    ) -> Result<RoutineRewrite, TransformError> {
        let name = routine.plain_name();
        let mut probes = 0;

        rewrite_lists(&mut routine.body, &mut |list: &mut Vec<Statement>| {
            let original = std::mem::take(list);
            list.reserve(original.len() * 2);
            for statement in original {
                if statement.is_instrumentable() {
                    let line = context.absolute_line(statement.position);
                    list.push(Statement::generic(
                        coverage_call(context.filename, &name, line),
                        statement.position,
                    ));
                    probes += 1;
                }
                list.push(statement);
            }
        });

        Ok(RoutineRewrite { routine, probes })
    }
}

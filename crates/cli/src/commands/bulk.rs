use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use crate::cli::Cli;
use crate::connect::{CachingFactory, SessionFactory};
use crate::context::CommandContext;
use crate::error::{CliError, Result};

/// Splits a raw argument vector into per-command groups. `--` ends the
/// current group, `\--` stands for a literal `--` inside a group, and empty
/// groups are dropped.
pub fn split_args(args: &[String]) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for arg in args {
        match arg.as_str() {
            "\\--" => current.push("--".to_string()),
            "--" => groups.push(std::mem::take(&mut current)),
            other => current.push(other.to_string()),
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups.retain(|group| !group.is_empty());
    groups
}

/// Runs the groups strictly in order. The first non-zero exit code stops
/// the plan and becomes its result; an empty plan exits 0.
pub async fn run_plan<F>(groups: Vec<Vec<String>>, mut run: F) -> Result<i32>
where
    F: AsyncFnMut(Vec<String>) -> Result<i32>,
{
    for group in groups {
        let code = run(group).await?;
        if code != 0 {
            return Ok(code);
        }
    }
    Ok(0)
}

pub async fn execute(ctx: &CommandContext, args: Vec<String>) -> Result<i32> {
    let groups = split_args(&args);
    debug!(target = "replkit", ?groups, "bulk plan");

    // Every sub-command resolves sessions through one shared cache, so a
    // repl is connected to at most once per bulk run.
    let cache = Arc::new(CachingFactory::new(ctx.sessions()));
    let shared = ctx.with_sessions(Arc::clone(&cache) as Arc<dyn SessionFactory>);

    let code = run_plan(groups, async |group| {
        debug!(target = "replkit", ?group, "bulk step");
        let mut argv = vec!["replkit".to_string()];
        argv.extend(group);
        let cli =
            Cli::try_parse_from(argv).map_err(|error| CliError::fatal(error.to_string()))?;
        Box::pin(crate::commands::dispatch(cli.command, &shared)).await
    })
    .await;

    cache.close_all().await;
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn split_groups_on_double_dash() {
        let groups = split_args(&args(&["a", "--", "b", "c", "\\--", "d"]));
        assert_eq!(
            groups,
            vec![args(&["a"]), args(&["b", "c", "--", "d"])]
        );
    }

    #[test]
    fn no_delimiter_is_one_group() {
        assert_eq!(split_args(&args(&["run", "my-repl"])), vec![args(&["run", "my-repl"])]);
    }

    #[test]
    fn only_delimiters_is_an_empty_plan() {
        assert!(split_args(&args(&["--", "--"])).is_empty());
        assert!(split_args(&[]).is_empty());
    }

    #[tokio::test]
    async fn plan_stops_at_first_nonzero_code() {
        let codes = [0, 0, 2, 0];
        let mut ran = Vec::new();
        let code = run_plan(
            vec![
                args(&["a"]),
                args(&["b"]),
                args(&["c"]),
                args(&["d"]),
            ],
            async |group| {
                ran.push(group[0].clone());
                Ok(codes[ran.len() - 1])
            },
        )
        .await
        .unwrap();
        assert_eq!(code, 2);
        assert_eq!(ran, args(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn empty_plan_exits_zero() {
        let code = run_plan(Vec::new(), async |_group| {
            panic!("nothing should run");
        })
        .await
        .unwrap();
        assert_eq!(code, 0);
    }
}

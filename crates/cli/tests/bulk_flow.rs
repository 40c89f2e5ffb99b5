//! End-to-end bulk runs over a scratch configuration file.

use replkit_cli::cli::Commands;
use replkit_cli::commands;
use replkit_cli::connect::Endpoints;
use replkit_cli::context::CommandContext;

fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn bulk_reparses_and_runs_groups_sequentially() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replkit.json");
    let ctx = CommandContext::new(path.clone(), Endpoints::default(), false);

    let code = commands::dispatch(
        Commands::Bulk {
            args: args(&["auth", "--key", "aaaaaa:bbbbbb", "--", "link", "abc123"]),
        },
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(code, 0);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["key"], "aaaaaa:bbbbbb");
    let cwd = std::env::current_dir().unwrap().display().to_string();
    assert_eq!(written["repls"][cwd.as_str()], "abc123");
}

#[tokio::test]
async fn bulk_surfaces_parse_failures() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CommandContext::new(
        dir.path().join("replkit.json"),
        Endpoints::default(),
        false,
    );

    let result = commands::dispatch(
        Commands::Bulk {
            args: args(&["frobnicate"]),
        },
        &ctx,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn empty_bulk_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CommandContext::new(
        dir.path().join("replkit.json"),
        Endpoints::default(),
        false,
    );

    let code = commands::dispatch(Commands::Bulk { args: Vec::new() }, &ctx)
        .await
        .unwrap();
    assert_eq!(code, 0);
}

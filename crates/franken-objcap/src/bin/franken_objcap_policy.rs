use std::fs;

use anyhow::{Context, Result, bail};

use frankenengine_objcap::{PolicyConfig, PolicyContext, TamingManifest};

fn main() {
    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error:#}");
        std::process::exit(2);
    }
}

fn run(args: Vec<String>) -> Result<()> {
    let Some(command) = args.first() else {
        bail!(usage());
    };

    match command.as_str() {
        "apply" => run_apply(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{}", usage());
            Ok(())
        }
        other => bail!("unknown subcommand '{other}'\n\n{}", usage()),
    }
}

fn usage() -> String {
    [
        "franken_objcap_policy usage:",
        "  franken_objcap_policy apply --manifest <path> [--config <path>] [--summary]",
    ]
    .join("\n")
}

fn run_apply(args: &[String]) -> Result<()> {
    let mut manifest_path: Option<&str> = None;
    let mut config_path: Option<&str> = None;
    let mut summary = false;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--manifest" => {
                index += 1;
                let value = args.get(index).context("--manifest requires a path")?;
                manifest_path = Some(value);
            }
            "--config" => {
                index += 1;
                let value = args.get(index).context("--config requires a path")?;
                config_path = Some(value);
            }
            "--summary" => summary = true,
            flag => bail!("unknown flag for apply: {flag}"),
        }
        index += 1;
    }

    let manifest_path = manifest_path.context("missing required --manifest <path>")?;
    let manifest = TamingManifest::from_json(&read(manifest_path)?)
        .with_context(|| format!("invalid manifest {manifest_path}"))?;
    let config = match config_path {
        Some(path) => PolicyConfig::from_json(&read(path)?)
            .with_context(|| format!("invalid config {path}"))?,
        None => PolicyConfig::default(),
    };

    let mut ctx = PolicyContext::new(config);
    let report = ctx
        .apply_manifest(&manifest)
        .with_context(|| format!("failed to apply {manifest_path}"))?;
    let snapshot = ctx.snapshot();
    let digest = snapshot.digest()?;

    if summary {
        println!(
            "trace_id={} host_types={} readable={} methods={} mutators={} installed={} grants={} frozen={} digest={}",
            ctx.config().trace_id,
            report.host_types,
            report.readable,
            report.methods,
            report.mutators,
            report.installed_operations,
            snapshot.grants.len(),
            snapshot.frozen.len(),
            digest,
        );
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "report": report,
                "digest": digest,
                "snapshot": snapshot,
            }))
            .context("failed to encode snapshot")?
        );
    }
    Ok(())
}

fn read(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
}

//! `netkatc`: compile a NetKAT policy to flow tables, or inspect its FDD
//!
//! `netkatc compile --policy <file|-> [--switch <id>] [--options <file>] [--layout <file>]`
//! reads a JSON policy (and, if given, JSON options/layout), compiles it,
//! and writes the resulting flow table(s) as JSON to stdout.
//!
//! `netkatc show --policy <file> [--dot]` prints the compiled FDD's
//! canonical textual form (or GraphViz DOT with `--dot`) without emitting a
//! table — the debugging analogue of reading back a serialized artifact.

use std::{env, fs, io::Read as _};

use anyhow::{bail, Context};

use netkat_fdd::cache::Cache;
use netkat_fdd::compiler::compile_local;
use netkat_fdd::multitable::{to_multitable, Layout};
use netkat_fdd::options::{CompileRequest, Options};
use netkat_fdd::policy::Policy;
use netkat_fdd::table::to_table;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn read_file_or_stdin(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading from stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {path}"))
    }
}

fn cmd_compile(args: &[String]) -> anyhow::Result<()> {
    let policy_path = parse_flag(args, "--policy").unwrap_or_else(|| "-".to_string());
    let flag_switch = parse_flag(args, "--switch")
        .map(|s| s.parse::<u64>())
        .transpose()
        .context("parsing --switch")?;

    let policy_contents = read_file_or_stdin(&policy_path)?;
    let (policy, options, switch) = if let Ok(request) = serde_json::from_str::<CompileRequest>(&policy_contents) {
        (request.policy, request.options, flag_switch.or(request.switch))
    } else {
        let policy: Policy = serde_json::from_str(&policy_contents).context("parsing policy JSON")?;
        let options = match parse_flag(args, "--options") {
            Some(path) => Options::from_path_or_stdin(&path).context("parsing options")?,
            None => Options::default(),
        };
        (policy, options, flag_switch)
    };

    let order = options
        .field_order
        .resolve(Some(&policy))
        .context("resolving field_order")?;
    let cache = Cache::new(order);
    let fdd = compile_local(&cache, &policy, switch, &options).context("compiling policy")?;

    let output = if let Some(layout_path) = parse_flag(args, "--layout") {
        let layout_json = read_file_or_stdin(&layout_path)?;
        let layout: Layout = serde_json::from_str(&layout_json).context("parsing layout JSON")?;
        let mt = to_multitable(&cache, fdd, &layout, &options).context("emitting multi-table")?;
        serde_json::to_string_pretty(&mt).context("serializing multi-table output")?
    } else {
        let table = to_table(&cache, fdd, &options).context("emitting single table")?;
        serde_json::to_string_pretty(&table).context("serializing table output")?
    };
    println!("{output}");
    Ok(())
}

fn cmd_show(args: &[String]) -> anyhow::Result<()> {
    let policy_path = parse_flag(args, "--policy").unwrap_or_else(|| "-".to_string());
    let policy_contents = read_file_or_stdin(&policy_path)?;
    let policy: Policy = match serde_json::from_str::<CompileRequest>(&policy_contents) {
        Ok(request) => request.policy,
        Err(_) => serde_json::from_str(&policy_contents).context("parsing policy JSON")?,
    };

    let cache = Cache::default();
    let fdd = compile_local(&cache, &policy, None, &Options::default()).context("compiling policy")?;

    if has_flag(args, "--dot") {
        print!("{}", netkat_fdd::fdd::to_dotfile(&cache, fdd));
    } else {
        print!("{}", netkat_fdd::fdd::to_string_repr(&cache, fdd));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("compile") => cmd_compile(&args[2..]),
        Some("show") => cmd_show(&args[2..]),
        _ => bail!("usage: netkatc <compile|show> --policy <file|-> [--switch <id>] [--options <file>] [--layout <file>] [--dot]"),
    }
}

use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use arbor_sdk::{Connection, ConnectionConfig, ObjectId, Value, VerifyReport};

use crate::cli::*;
use crate::json::{parse_condition, parse_path, parse_value, to_json};

const DEFAULT_DB: &str = "arbor.db";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut conn = connect(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Create(args) => cmd_create(&mut conn, args, format),
        Command::Read(args) => cmd_read(&mut conn, args, format),
        Command::Modify(args) => cmd_modify(&mut conn, args, format),
        Command::Insert(args) => cmd_insert(&mut conn, args, format),
        Command::Delete(args) => cmd_delete(&mut conn, args, format),
        Command::Search(args) => cmd_search(&mut conn, args, format),
        Command::Dump => cmd_dump(&mut conn, format),
        Command::Repair => cmd_repair(&mut conn, format),
        Command::Verify => cmd_verify(&mut conn, format),
    }?;
    conn.close()?;
    Ok(())
}

fn connect(cli: &Cli) -> anyhow::Result<Connection> {
    let mut config = match &cli.config {
        Some(path) => ConnectionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConnectionConfig {
            path: Some(PathBuf::from(DEFAULT_DB)),
            ..ConnectionConfig::default()
        },
    };
    if let Some(db) = &cli.db {
        config.path = Some(db.clone());
    }
    if let Some(mode) = cli.open_mode {
        config.open_mode = mode.into();
    }
    debug!(?config, "connecting");
    Connection::connect(&config).context("opening database")
}

fn done(format: OutputFormat, message: String) {
    match format {
        OutputFormat::Text => println!("{} {}", "✓".green().bold(), message),
        OutputFormat::Json => println!("{}", json!({ "ok": true })),
    }
}

fn print_value(value: &Value, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = match format {
        OutputFormat::Text => serde_json::to_string_pretty(&to_json(value))?,
        OutputFormat::Json => to_json(value).to_string(),
    };
    println!("{rendered}");
    Ok(())
}

fn cmd_create(conn: &mut Connection, args: CreateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let value = parse_value(&args.value)?;
    let at = args.at.as_deref().map(parse_path).transpose()?;
    let id = conn.create(&value, at.as_ref())?.into_id()?;
    match format {
        OutputFormat::Text => println!("{} Created object {}", "✓".green().bold(), id.to_string().yellow()),
        OutputFormat::Json => println!("{}", json!({ "id": i64::from(id) })),
    }
    Ok(())
}

fn cmd_read(conn: &mut Connection, args: ReadArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = ObjectId::new(args.id);
    let path = args.path.as_deref().map(parse_path).transpose()?;
    let response = if args.masks.is_empty() {
        conn.read(id, path.as_ref())?
    } else {
        let masks = args
            .masks
            .iter()
            .map(|m| parse_path(m))
            .collect::<anyhow::Result<Vec<_>>>()?;
        conn.read_by_masks(id, path.as_ref(), &masks)?
    };
    print_value(&response.into_value()?, format)
}

fn cmd_modify(conn: &mut Connection, args: ModifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = ObjectId::new(args.id);
    let path = parse_path(&args.path)?;
    let value = parse_value(&args.value)?;
    conn.modify(id, &path, &value, args.replace)?;
    done(format, format!("Modified {} at {}", id.to_string().yellow(), path));
    Ok(())
}

fn cmd_insert(conn: &mut Connection, args: InsertArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = ObjectId::new(args.id);
    let target = parse_path(&args.target)?;
    let values = args
        .values
        .iter()
        .map(|v| parse_value(v))
        .collect::<anyhow::Result<Vec<_>>>()?;
    conn.insert_many(id, &target, &values, args.replace)?;
    done(
        format,
        format!("Inserted {} value(s) into {} at {}", values.len(), id.to_string().yellow(), target),
    );
    Ok(())
}

fn cmd_delete(conn: &mut Connection, args: DeleteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = ObjectId::new(args.id);
    if args.paths.is_empty() {
        conn.delete(id, None)?;
        done(format, format!("Deleted object {}", id.to_string().yellow()));
        return Ok(());
    }
    let paths = args
        .paths
        .iter()
        .map(|p| parse_path(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    conn.delete_many(id, &paths)?;
    done(format, format!("Deleted {} path(s) from {}", paths.len(), id.to_string().yellow()));
    Ok(())
}

fn cmd_search(conn: &mut Connection, args: SearchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let condition = args.condition.as_deref().map(parse_condition).transpose()?;
    let ids = conn.search(condition.as_ref())?.into_ids()?;
    match format {
        OutputFormat::Text if ids.is_empty() => println!("No matching objects."),
        OutputFormat::Text => {
            for id in &ids {
                println!("{}", id.to_string().yellow());
            }
        }
        OutputFormat::Json => {
            let ids: Vec<i64> = ids.into_iter().map(i64::from).collect();
            println!("{}", json!(ids));
        }
    }
    Ok(())
}

fn cmd_dump(conn: &mut Connection, format: OutputFormat) -> anyhow::Result<()> {
    let objects = conn.dump()?.into_dump()?;
    match format {
        OutputFormat::Text => {
            for (id, value) in &objects {
                println!("{} {}", "object".dimmed(), id.to_string().yellow().bold());
                print_value(value, format)?;
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = objects
                .iter()
                .map(|(id, value)| json!({ "id": i64::from(*id), "value": to_json(value) }))
                .collect();
            println!("{}", serde_json::Value::Array(rows));
        }
    }
    Ok(())
}

fn cmd_repair(conn: &mut Connection, format: OutputFormat) -> anyhow::Result<()> {
    let summary = conn.repair()?.into_repair_summary()?;
    match format {
        OutputFormat::Text => {
            println!("{} Repair complete", "✓".green().bold());
            println!("  Empty tables dropped: {}", summary.tables_dropped);
            println!("  Catalog rows: {}", summary.catalog_rows);
            println!("  List sizes: {}", summary.list_sizes);
        }
        OutputFormat::Json => println!(
            "{}",
            json!({
                "tables_dropped": summary.tables_dropped,
                "catalog_rows": summary.catalog_rows,
                "list_sizes": summary.list_sizes,
            })
        ),
    }
    Ok(())
}

fn cmd_verify(conn: &mut Connection, format: OutputFormat) -> anyhow::Result<()> {
    let report = conn.verify()?;
    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => {
            let violations: Vec<_> = report
                .violations
                .iter()
                .map(|v| {
                    json!({
                        "id": v.id.map(i64::from),
                        "kind": format!("{:?}", v.kind),
                        "description": v.description,
                    })
                })
                .collect();
            println!(
                "{}",
                json!({
                    "valid": report.is_valid(),
                    "objects": report.objects,
                    "field_tables": report.field_tables,
                    "catalog_rows": report.catalog_rows,
                    "violations": violations,
                })
            );
        }
    }
    if !report.is_valid() {
        anyhow::bail!("{} violation(s) found; `arbor repair` rebuilds the catalog", report.violations.len());
    }
    Ok(())
}

fn print_report(report: &VerifyReport) {
    let status = if report.is_valid() { "✓".green().bold() } else { "✗".red().bold() };
    println!("{} {} objects, {} field tables, {} catalog rows", status, report.objects, report.field_tables, report.catalog_rows);
    for violation in &report.violations {
        let scope = violation
            .id
            .map(|id| format!("object {id}"))
            .unwrap_or_else(|| "database".to_string());
        println!("  {} [{:?}] {}: {}", "!".red(), violation.kind, scope.yellow(), violation.description);
    }
}

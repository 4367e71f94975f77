// src/cli/inspect.rs
use super::{CliError, CliResult, Context, IdentifierAction, SettingsAction};
use crate::settings::io::save_settings_to;
use crate::sheets::database::DbReader;
use crate::sheets::identifier;
use crate::sheets::RowStatus;

pub fn rows(ctx: &Context, source_id: i64, sheet: &str, status: Option<RowStatus>) -> CliResult {
    let conn = ctx.db.open()?;
    let source = DbReader::get_source(&conn, source_id)?;
    let rows = DbReader::rows_for_sheet(&conn, source.id, sheet, status)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let counts = DbReader::count_by_status(&conn, source.id, sheet)?;
    println!(
        "{}/{}: {} active, {} deleted, {} error\n",
        source.name, sheet, counts.active, counts.deleted, counts.error
    );
    println!("{:<6} {:<38} {:<8} {}", "Row", "Identifier", "Status", "Content");
    println!("{}", "-".repeat(80));
    for row in rows {
        println!(
            "{:<6} {:<38} {:<8} {}",
            row.row_number,
            row.identifier,
            row.status,
            row.content.join(" | ")
        );
    }
    Ok(())
}

pub fn identifier(action: &IdentifierAction) -> CliResult {
    match action {
        IdentifierAction::New { count } => {
            for _ in 0..*count {
                println!("{}", identifier::generate());
            }
            Ok(())
        }
        IdentifierAction::Inspect { text } => {
            let parsed = identifier::parse(text)
                .ok_or_else(|| CliError::Usage(format!("'{}' is not a valid identifier", text)))?;
            println!("Identifier: {}", parsed.uuid);
            println!("Version:    {}", parsed.version);
            println!("Timestamp:  {}", parsed.timestamp.to_rfc3339());
            Ok(())
        }
    }
}

pub fn settings(ctx: &Context, action: SettingsAction) -> CliResult {
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&ctx.settings)?);
        }
        SettingsAction::Init => {
            save_settings_to(&ctx.config_path, &ctx.settings)?;
            println!("Wrote settings to {}", ctx.config_path.display());
        }
    }
    Ok(())
}

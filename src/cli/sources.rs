// src/cli/sources.rs
use super::{CliResult, Context, SourceAction};
use crate::sheets::database::{DbReader, DbWriter};

pub fn run(ctx: &Context, action: SourceAction) -> CliResult {
    let conn = ctx.db.open()?;
    match action {
        SourceAction::Add { name, external_id } => {
            let source = DbWriter::register_source(&conn, &name, &external_id)?;
            println!("Registered source {} ({})", source.id, source.name);
        }
        SourceAction::List => {
            let sources = DbReader::list_sources(&conn)?;
            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
                return Ok(());
            }
            println!("{:<6} {:<24} {:<46} {}", "Id", "Name", "Spreadsheet", "Active");
            println!("{}", "-".repeat(84));
            for source in sources {
                println!(
                    "{:<6} {:<24} {:<46} {}",
                    source.id,
                    source.name,
                    source.external_id,
                    if source.active { "yes" } else { "no" }
                );
            }
        }
        SourceAction::Activate { id } => {
            DbWriter::set_source_active(&conn, id, true)?;
            println!("Source {} activated", id);
        }
        SourceAction::Deactivate { id } => {
            DbWriter::set_source_active(&conn, id, false)?;
            println!("Source {} deactivated", id);
        }
        SourceAction::Remove { id } => {
            DbWriter::delete_source(&conn, id)?;
            println!("Source {} removed", id);
        }
    }
    Ok(())
}

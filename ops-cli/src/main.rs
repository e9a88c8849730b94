//! Learnmap operator CLI
//!
//! ```bash
//! learnmap migrate up
//! learnmap migrate status
//! learnmap schema show assignments
//! learnmap rule compile --collection assignments --op view 'group.students.id ?= @request.auth.id'
//! learnmap authorize --collection assignments --op view --identity s1 --role student \
//!     --record a1.json --data school.json
//! ```

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, MigrateAction, RuleAction, SchemaAction};
use colored::Colorize;
use commands::{identity_from_flags, Workspace};
use config_engine::{ConfigError, ConfigLoader};
use error_common::{codes, log_error, EngineError, ErrorCode};
use logger_redacted::LoggerError;
use schema_migrations::MigrationError;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error = EngineError::Coded {
                code: error_code(&e),
                message: format!("{e:#}"),
            };
            log_error("learnmap", &error);
            eprintln!("{} {}", "error:".red().bold(), error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load()?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let _logging = logger_redacted::init_logging(&config.logging)?;

    let workspace = Workspace::open(config).await?;

    match cli.command {
        Commands::Migrate { action } => match action {
            MigrateAction::Up { to } => workspace.migrate_up(to).await,
            MigrateAction::Down { steps } => workspace.migrate_down(steps).await,
            MigrateAction::Status => Ok(workspace.migrate_status()),
        },
        Commands::Schema {
            action: SchemaAction::Show { collection },
        } => workspace.schema_show(collection.as_deref()),
        Commands::Rule {
            action: RuleAction::Compile {
                collection,
                op,
                rule,
            },
        } => workspace.rule_compile(&collection, op, &rule),
        Commands::Authorize {
            collection,
            op,
            identity,
            role,
            record,
            data,
        } => {
            let identity = identity_from_flags(identity.as_deref(), role.as_deref());
            workspace
                .authorize(&collection, op, identity, &record, data.as_deref(), cli.verbose)
                .await
        }
    }
}

/// Code of the first workspace error in the chain
fn error_code(error: &anyhow::Error) -> &'static str {
    error
        .chain()
        .find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<MigrationError>() {
                Some(e.code())
            } else if let Some(e) = cause.downcast_ref::<auth_rules::AuthzError>() {
                Some(e.code())
            } else if let Some(e) = cause.downcast_ref::<ConfigError>() {
                Some(e.code())
            } else {
                cause.downcast_ref::<LoggerError>().map(ErrorCode::code)
            }
        })
        .unwrap_or(codes::INTERNAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_follows_the_chain() {
        let err = anyhow::Error::new(auth_rules::AuthzError::CollectionNotFound("lessons".into()))
            .context("schema show failed");
        assert_eq!(error_code(&err), codes::not_found::COLLECTION_NOT_FOUND);

        let err = anyhow::Error::new(MigrationError::DuplicateVersion(7));
        assert_eq!(error_code(&err), codes::migration::DUPLICATE_VERSION);

        assert_eq!(error_code(&anyhow::anyhow!("boom")), codes::INTERNAL);
    }
}

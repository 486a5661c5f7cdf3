use std::collections::BTreeMap;
use std::process::ExitCode;

use backuptool_lib::cli::{render_listing, Action, Cli};
use backuptool_lib::command::SystemRunner;
use backuptool_lib::config::Config;
use backuptool_lib::job::{Job, Operation, Outcome};

use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    if let Err(e) = env_logger.try_init() {
        eprintln!("Initializing the logger failed: {e}");
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let mut failed = false;
    let jobs: Vec<_> = config
        .jobs(&cli.jobs)
        .into_iter()
        .filter_map(|job| {
            job.map_err(|e| {
                log::error!("{e}");
                failed = true;
            })
            .ok()
        })
        .collect();
    if jobs.is_empty() && !failed {
        log::warn!("No jobs configured in {}", cli.config.display());
    }

    let runner = SystemRunner;
    let operation = Operation::from(&cli.action);
    let mut listings = BTreeMap::new();

    for backup_job in &jobs {
        let job = Job::new(backup_job, &runner)
            .with_workdir(config.workdir.clone())
            .with_restore_root(&config.restore_root);

        match job.execute(&operation) {
            Ok(Outcome::Created { archive, rotated }) => {
                log::info!(target: "job", "Created {archive}");
                if !rotated.is_empty() {
                    log::info!(target: "job", "Rotated {} outdated backup(s)", rotated.len());
                }
            }
            Ok(Outcome::Restored(Some(archive))) => {
                log::info!(target: "job", "Restored {archive}");
            }
            Ok(Outcome::Restored(None)) => {
                log::info!(target: "job", "Nothing to restore for job {}", job.name());
            }
            Ok(Outcome::Listed(entries)) => {
                if let Action::List { json: false } = cli.action {
                    print!(
                        "{}",
                        render_listing(job.name(), backup_job.target.kind(), &entries)
                    );
                }
                listings.insert(job.name().to_string(), entries);
            }
            Ok(Outcome::Rotated(deleted)) => {
                log::info!(target: "job", "Deleted {} outdated backup(s) of job {}", deleted.len(), job.name());
            }
            Ok(Outcome::Deleted(archive)) => {
                log::info!(target: "job", "Deleted {archive}");
            }
            Err(e) => {
                log::error!(target: "job", "{e}");
                failed = true;
            }
        }
    }

    if let Action::List { json: true } = cli.action {
        match serde_json::to_string_pretty(&listings) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                log::error!("Serializing the listing failed: {e}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{load_settings, ViewState, WorkbenchController};

/// Headless workbench runner: analyze a market question and optionally
/// generate the full report.
#[derive(Parser, Debug)]
struct Args {
    /// Access token from a completed browser sign-in.
    #[arg(long)]
    access_token: String,
    /// The market question to analyze.
    question: String,
    /// Continue past the summary and generate the full report.
    #[arg(long)]
    full_report: bool,
    /// Write the report to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// A submit that did not land in `Review` produced nothing to print; a blank
/// question never leaves `Idle`.
fn check_submit_outcome(state: ViewState, error_message: &str) -> Result<()> {
    match state {
        ViewState::Review => Ok(()),
        ViewState::Error => bail!("analysis failed: {error_message}"),
        ViewState::Idle => bail!("nothing to analyze: the question is empty"),
        state => bail!("analysis did not complete (state {state:?})"),
    }
}

fn check_report_outcome(state: ViewState, error_message: &str) -> Result<()> {
    match state {
        ViewState::Final => Ok(()),
        ViewState::Error => bail!("report generation failed: {error_message}"),
        state => bail!("report generation did not run (state {state:?})"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let settings = load_settings();
    let auth = settings.auth_client()?;
    let webhook = settings.webhook_client()?;

    let user = auth
        .current_user(&args.access_token)
        .await?
        .context("access token is expired or invalid; sign in again")?;
    println!("Signed in as {} (user_id={})", user.email, user.id);

    let mut workbench = WorkbenchController::new(webhook, user.id);

    let state = workbench.submit(&args.question).await;
    check_submit_outcome(state, workbench.error_message())?;
    let session = workbench.session();
    println!("session_id={}", session.session_id);
    println!();
    println!("{}", session.summary);
    println!();
    println!(
        "sophistication={} score={:.2} markets={}",
        session.meta.label, session.meta.score, session.meta.market_count
    );

    if args.full_report {
        let state = workbench.generate_report().await;
        check_report_outcome(state, workbench.error_message())?;
        let report = workbench.session().report.clone();
        match args.output {
            Some(path) => {
                fs::write(&path, &report)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Wrote report to {}", path.display());
            }
            None => {
                println!();
                println!("{report}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_question_is_reported_instead_of_printing_an_empty_session() {
        let err = check_submit_outcome(ViewState::Idle, "").expect_err("must fail");
        assert!(err.to_string().contains("question is empty"));
    }

    #[test]
    fn submit_outcomes_map_to_exit_status() {
        check_submit_outcome(ViewState::Review, "").expect("review proceeds");
        let err = check_submit_outcome(ViewState::Error, "analyze failed with status 500")
            .expect_err("must fail");
        assert!(err.to_string().contains("status 500"));
    }

    #[test]
    fn report_outcomes_map_to_exit_status() {
        check_report_outcome(ViewState::Final, "").expect("final proceeds");
        let err = check_report_outcome(ViewState::Review, "").expect_err("must fail");
        assert!(err.to_string().contains("did not run"));
    }
}

// src/cli/report.rs — Report fetch commands

use crate::infra::config::Config;
use crate::infra::errors::VendoraError;
use crate::infra::paths;
use crate::infra::session::Session;
use crate::reports::{ReportClient, ReportKind, ReportParams};

pub async fn run_report(
    config: &Config,
    session: &Session,
    kind: ReportKind,
    params: ReportParams,
    csv: bool,
) -> anyhow::Result<()> {
    let client = ReportClient::new(
        config.endpoints.report_webhook_url.clone(),
        config.endpoints.report_api_url.clone(),
        Some(session.token.clone()),
    );

    // Vendors are scoped to themselves; administrators may pass --vendor-id
    // through params untouched.
    let params = if params.vendor_id.is_none() && !session.is_administrator() {
        ReportParams {
            vendor_id: Some(session.user_id),
            ..params
        }
    } else {
        params
    };

    if csv {
        match client.fetch_csv_url(kind, &params).await {
            Ok(csv_ref) => {
                println!("{} -> {}", csv_ref.filename, csv_ref.url);
            }
            Err(e) if e.is_empty_report() => eprintln!("{e}"),
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    match client.fetch_spreadsheet(kind, &params).await {
        Ok((bytes, filename)) => {
            paths::ensure_dirs().await?;
            let path = paths::downloads_dir().join(&filename);
            tokio::fs::write(&path, &bytes).await?;
            eprintln!(
                "Saved {} ({}) to {}",
                filename,
                crate::util::format_file_size(bytes.len() as u64),
                path.display()
            );
            Ok(())
        }
        Err(e) if e.is_empty_report() => {
            eprintln!("{e}");
            Ok(())
        }
        Err(VendoraError::Unauthorized) => {
            eprintln!("Session expired. Run `vendora login`.");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

use anyhow::{Context, Result, bail};
use cert_anchor::clock::{Clock, SystemClock};
use cert_anchor::config::Config;
use cert_anchor::ledger::{CertificateId, DevLedger, LedgerClient};
use cert_anchor::metrics::OrchestratorMetrics;
use cert_anchor::network::SessionManager;
use cert_anchor::{CertificateInput, CertificateOrchestrator, IssuanceResult};
use chrono::Duration;
use log::info;
use serde::Serialize;
use std::sync::Arc;

const DEMO_RECIPIENT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

fn print_json<T: Serialize>(label: &str, value: &T) -> Result<()> {
    println!("{}:\n{}\n", label, serde_json::to_string_pretty(value)?);
    Ok(())
}

fn issued_id(result: &IssuanceResult) -> Result<CertificateId> {
    match (&result.certificate_id, &result.error) {
        (Some(id), _) => Ok(id.clone()),
        (None, Some(err)) => bail!("issuance failed in {:?}: {}", err.phase, err.message),
        (None, None) => bail!("issuance returned no certificate id"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let live = std::env::args().any(|arg| arg == "--live");

    println!("╔═══════════════════════════════════════════════════════╗");
    println!("║        Ledger-anchored certificate orchestrator       ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    let config = Config::load().context("loading configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(OrchestratorMetrics::new());
    let issuer = config
        .ledger
        .sender
        .clone()
        .context("ledger.sender must be configured")?;

    let session = Arc::new(SessionManager::new(config.network.clone()));
    for network in &config.networks {
        session.add_network(network.clone()).await?;
    }

    let (ledger, dev_ledger): (Arc<dyn LedgerClient>, Option<Arc<DevLedger>>) = if live {
        let rpc: Arc<dyn LedgerClient> = Arc::new(config.build_ledger()?.with_clock(clock.clone()));
        (rpc, None)
    } else {
        let dev = Arc::new(DevLedger::new(config.network.chain_id, issuer.clone(), clock.clone()));
        (dev.clone(), Some(dev))
    };
    let chain_id = ledger.chain_id().await.context("reading ledger chain id")?;
    session.attach(chain_id).await;
    info!("attached to chain {} ({})", chain_id, if live { "live" } else { "dev" });

    let orchestrator = CertificateOrchestrator::from_config(
        &config,
        ledger.clone(),
        session.clone(),
        clock.clone(),
        metrics.clone(),
    )
    .await?;

    println!("[1/4] Issuing a certificate valid for one year...");
    let input = CertificateInput::new(DEMO_RECIPIENT, issuer.clone())
        .with_recipient_name("Demo Recipient")
        .with_title("Distributed Systems Practicum")
        .with_issuer_name("Example Institute")
        .with_expiry(clock.now() + Duration::days(365));
    let issued = orchestrator.issue_certificate(&input).await;
    print_json("issuance", &issued)?;
    let valid_id = issued_id(&issued)?;
    print_json("verification", &orchestrator.verify_certificate(&valid_id).await)?;

    println!("[2/4] Issuing a certificate that expired yesterday...");
    let expired = orchestrator
        .issue_certificate(&input.clone().with_expiry(clock.now() - Duration::days(1)))
        .await;
    let expired_id = issued_id(&expired)?;
    print_json("verification", &orchestrator.verify_certificate(&expired_id).await)?;

    println!("[3/4] Revoking the first certificate...");
    match &dev_ledger {
        Some(dev) => {
            dev.revoke(&valid_id, &issuer).await?;
            print_json("verification", &orchestrator.verify_certificate(&valid_id).await)?;
        }
        None => println!("      revocation is issuer-controlled on the live contract; skipped\n"),
    }

    println!("[4/4] Recording a verification on the ledger...");
    print_json("audit", &orchestrator.verify_and_record(&expired_id).await)?;

    if let Some(dev) = &dev_ledger {
        println!(
            "Dev chain: {} blocks, {} bytes",
            dev.get_chain_length().await,
            dev.get_blockchain_size().await
        );
    }

    let snapshot = metrics.snapshot();
    snapshot.print_report();
    snapshot
        .save_to_csv("metrics.csv")
        .context("writing metrics.csv")?;
    println!("\nMetrics appended to metrics.csv");
    Ok(())
}

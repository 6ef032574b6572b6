mod common;

use cert_anchor::IssuancePhase;
use cert_anchor::ledger::LedgerClient;
use cert_anchor::storage::BackendKind;
use cert_anchor::{CertificateInput, StorageLocator};
use common::{Harness, HarnessOptions, RECIPIENT};
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test(start_paused = true)]
async fn issues_and_returns_id_locator_and_hash() {
    let h = Harness::new().await;
    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(365)).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.certificate_id.as_ref().map(|id| id.as_str()), Some("1"));
    let locator: StorageLocator = result.metadata_locator.as_deref().unwrap().parse().unwrap();
    assert_eq!(locator.backend(), Some(BackendKind::Arweave));
    assert!(result.transaction_hash.as_deref().unwrap().starts_with("0x"));

    let record = h.ledger.get_certificate(&"1".into()).await.unwrap();
    assert_eq!(record.metadata_locator, locator.to_string());
    assert_eq!(record.recipient, RECIPIENT);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.issuances_started, 1);
    assert_eq!(snapshot.issuances_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn metadata_is_stored_before_anything_reaches_the_ledger() {
    let h = Harness::new().await;
    assert!(h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await.success);

    let stored = h.log.position("store.put").expect("metadata was never stored");
    let submitted = h
        .log
        .position("ledger.issue_certificate")
        .expect("issuance was never submitted");
    assert!(stored < submitted, "{:?}", h.log.entries());
}

#[tokio::test(start_paused = true)]
async fn primary_outage_falls_back_to_tagged_local_locator() {
    let h = Harness::new().await;
    h.primary.fail_puts(true);

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    assert!(result.success);
    let locator: StorageLocator = result.metadata_locator.unwrap().parse().unwrap();
    assert_eq!(locator.backend(), Some(BackendKind::Local));
    assert_eq!(h.fallback.len().await, 1);
    assert_eq!(h.metrics.snapshot().fallback_writes, 1);
}

#[tokio::test(start_paused = true)]
async fn no_transaction_is_submitted_when_every_backend_fails() {
    let h = Harness::new().await;
    h.primary.fail_puts(true);
    h.fallback.set_online(false);

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, "METADATA_STORE_FAILED");
    assert_eq!(error.phase, Some(IssuancePhase::StoringMetadata));
    assert!(error.retry_safe);
    assert_eq!(result.transaction_hash, None);

    assert_eq!(h.ledger.submissions(), 0);
    assert_eq!(h.log.position("ledger.issue_certificate"), None);
    assert_eq!(h.metrics.snapshot().issuance_failures["storing_metadata"], 1);
}

#[tokio::test(start_paused = true)]
async fn no_fallback_configured_means_store_failure() {
    let h = Harness::with_options(HarnessOptions {
        without_fallback: true,
        ..HarnessOptions::default()
    })
    .await;
    h.primary.fail_puts(true);

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    assert_eq!(result.error.unwrap().code, "METADATA_STORE_FAILED");
    assert_eq!(h.ledger.submissions(), 0);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_call() {
    let h = Harness::new().await;
    let input = CertificateInput::new("", cert_anchor::testutil::SAMPLE_ISSUER);

    let result = h.orchestrator.issue_certificate(&input).await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "INVALID_INPUT");
    assert_eq!(error.phase, Some(IssuancePhase::Formatting));
    assert!(h.log.entries().is_empty());
}

#[tokio::test]
async fn wrong_network_fails_fast() {
    let h = Harness::new().await;
    h.session.attach(1).await;

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "UNSUPPORTED_NETWORK");
    assert!(error.message.contains("1337"));
    assert_eq!(h.primary.put_count(), 0);
    assert_eq!(h.ledger.submissions(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_ledger_keeps_the_stored_locator() {
    let h = Harness::new().await;
    h.ledger.set_reachable(false).await;

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "LEDGER_UNREACHABLE");
    assert_eq!(error.phase, Some(IssuancePhase::SubmittingTransaction));
    assert!(!error.retry_safe);
    assert!(result.metadata_locator.unwrap().starts_with("ar://"));
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_is_a_failed_transaction() {
    let h = Harness::new().await;
    h.ledger.reject_next_submission().await;

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "ISSUANCE_TRANSACTION_FAILED");
    assert!(error.retry_safe);
    assert_eq!(result.transaction_hash, None);
}

#[tokio::test(start_paused = true)]
async fn reverted_transaction_reports_its_hash() {
    let h = Harness::new().await;
    h.ledger.revert_next_transaction().await;

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "ISSUANCE_TRANSACTION_FAILED");
    assert_eq!(error.phase, Some(IssuancePhase::AwaitingConfirmation));
    assert!(!error.retry_safe);
    assert!(result.transaction_hash.is_some());
    assert!(h.ledger.certificates_of(RECIPIENT).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn confirmation_timeout_is_distinct_and_recoverable() {
    let h = Harness::new().await;
    h.ledger.stall_confirmations(true).await;
    let input = h.input_expiring_in(30);

    let result = h.orchestrator.issue_certificate(&input).await;
    let error = result.error.clone().unwrap();
    assert_eq!(error.code, "CONFIRMATION_TIMEOUT");
    assert_eq!(error.phase, Some(IssuancePhase::AwaitingConfirmation));
    assert!(!error.retry_safe);

    // the transaction lands later, out of band
    h.ledger.stall_confirmations(false).await;
    h.ledger.mine_pending_transactions().await;

    let locator: StorageLocator = result.metadata_locator.unwrap().parse().unwrap();
    let record = h
        .orchestrator
        .find_issued_certificate(RECIPIENT, &locator)
        .await
        .unwrap()
        .expect("certificate should have landed");
    assert_eq!(record.certificate_id.as_str(), "1");
}

#[tokio::test(start_paused = true)]
async fn confirmed_transaction_without_event_is_a_data_error() {
    let h = Harness::new().await;
    h.ledger.omit_next_event().await;

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "ISSUANCE_EVENT_MISSING");
    assert_eq!(error.kind, cert_anchor::ErrorKind::Data);
    assert_eq!(error.phase, Some(IssuancePhase::ExtractingId));
}

#[tokio::test(start_paused = true)]
async fn duplicated_event_is_rejected() {
    let h = Harness::new().await;
    h.ledger.duplicate_next_event().await;

    let result = h.orchestrator.issue_certificate(&h.input_expiring_in(30)).await;
    assert_eq!(result.error.unwrap().code, "ISSUANCE_EVENT_MISSING");
}

#[tokio::test(start_paused = true)]
async fn cancel_before_submission_leaves_the_ledger_untouched() {
    let h = Harness::new().await;
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let result = h
        .orchestrator
        .issue_certificate_with_cancel(&h.input_expiring_in(30), Some(rx))
        .await;
    let error = result.error.unwrap();
    assert_eq!(error.code, "CANCELLED");
    assert!(error.retry_safe);
    assert_eq!(h.ledger.submissions(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_submission_only_stops_waiting() {
    let h = Harness::new().await;
    h.ledger.stall_confirmations(true).await;
    let (tx, rx) = watch::channel(false);
    let input = h.input_expiring_in(30);

    let canceller = async {
        while h.ledger.submissions() == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tx.send(true).unwrap();
    };
    let (result, _) = tokio::join!(
        h.orchestrator.issue_certificate_with_cancel(&input, Some(rx)),
        canceller
    );

    let error = result.error.unwrap();
    assert_eq!(error.code, "CONFIRMATION_ABANDONED");
    assert!(result.transaction_hash.is_some());

    h.ledger.stall_confirmations(false).await;
    assert_eq!(h.ledger.mine_pending_transactions().await, 1);
    assert_eq!(h.ledger.certificates_of(RECIPIENT).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_issuances_are_independent() {
    let h = Harness::new().await;
    let a = h.input_expiring_in(10);
    let b = h.input_expiring_in(20).with_title("Operating Systems");

    let (first, second) = tokio::join!(
        h.orchestrator.issue_certificate(&a),
        h.orchestrator.issue_certificate(&b)
    );
    assert!(first.success && second.success);
    assert_ne!(first.certificate_id, second.certificate_id);
    assert_ne!(first.metadata_locator, second.metadata_locator);
}

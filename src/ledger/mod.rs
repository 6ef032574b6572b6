pub mod block;
pub mod chain;
pub mod client;
pub mod rpc;
pub mod transaction;
pub mod types;

pub use chain::DevLedger;
pub use client::{LedgerClient, wait_for_receipt};
pub use rpc::RpcLedgerClient;
pub use transaction::{ContractCall, LedgerTransaction};
pub use types::{
    CERTIFICATE_ISSUED, CertificateId, CertificateRecord, LedgerEvent, LedgerVerification,
    TxHandle, TxReceipt, TxStatus, VERIFICATION_RECORDED,
};

pub mod auth;
pub mod broker;
pub mod http;
pub mod ledger;
pub mod types;

pub use auth::{AuthService, HttpAuthClient};
pub use broker::{BrokerService, HttpBrokerClient};
pub use ledger::{HttpLedger, Ledger};

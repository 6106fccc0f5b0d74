//! Per-service connectors built on the shared connection core.

pub mod action_builder;
pub mod action_network;
pub mod airtable;
pub mod bigquery;
pub mod helpscout;
pub mod openai;
pub mod ptv;
pub mod roi_crm;
pub mod sheets;
pub mod zoom;

pub(crate) mod google;

pub use action_builder::ActionBuilderConnector;
pub use action_network::ActionNetworkConnector;
pub use airtable::AirtableConnector;
pub use bigquery::BigQueryConnector;
pub use helpscout::{ConversationStatus, HelpScoutConnector};
pub use openai::OpenAiConnector;
pub use ptv::PtvConnector;
pub use roi_crm::RoiCrmConnector;
pub use sheets::SheetsConnector;
pub use zoom::ZoomConnector;

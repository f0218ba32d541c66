//! # TreeByte Adoption Flow
//!
//! Client-side core of the tree-token adoption flow: a user opens a
//! project's adopt surface, enters a token amount, and confirms; the flow
//! validates, checks the session, issues exactly one purchase request, and
//! on confirmation updates the user's token collection and point balance
//! exactly once. The dashboard reads the same [`store::TokenStore`] handle
//! at its own pace.
//!
//! | Concern       | Module                                   |
//! |---------------|------------------------------------------|
//! | Lifecycle     | [`machine`] — the attempt state machine  |
//! | Validation    | [`validator`]                            |
//! | Transaction   | [`client`] — `POST /token/buy-token`     |
//! | Collection    | [`store`]                                |
//! | Auth gate     | [`auth`]                                 |
//! | Toasts        | [`notify`]                               |
//!
//! The machine only talks to the endpoint through the [`client::PurchaseApi`]
//! trait and to the UI through [`notify::NotificationSink`], so both sides
//! can be faked in tests.

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod machine;
pub mod notify;
pub mod store;
pub mod validator;

pub use auth::Session;
pub use client::{
    FailureKind, HttpPurchaseClient, NewToken, PurchaseApi, PurchaseFailure, PurchaseOutcome,
    PurchaseReceipt,
};
pub use config::FlowConfig;
pub use errors::{AdoptionError, Result};
pub use machine::{AdoptionFlow, PurchaseState};
pub use notify::{Notification, NotificationKind, NotificationSink};
pub use store::{TokenEntry, TokenStore, POINTS_PER_TOKEN};

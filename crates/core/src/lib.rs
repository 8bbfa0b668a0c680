//! Core domain layer for the Meteorite indexer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services for the Cosmos inscriptions indexer. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    meteorite (binary)                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ meteorite-protocols │ meteorite-chain │ meteorite-objectstore│
//! │   (metaprotocols)   │     (LCD)       │    (payload store)   │
//! ├─────────────────────┴─────────────────┴──────────────────────┤
//! │                    meteorite-storage                         │
//! │                      (PostgreSQL)                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │                    meteorite-core  ← YOU ARE HERE            │
//! │              (models, urn, ports, services)                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Transaction, Inscription, Token, ...)
//! - [`urn`] - Metaprotocol URN parser
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (IndexerService)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! Ports define interfaces that external adapters must implement:
//!
//! - [`ports::ChainSource`] - Fetch blocks from a Cosmos chain
//! - [`ports::Repositories`] - Persist and query pipeline state
//! - [`ports::MetaprotocolHandler`] - Apply metaprotocol operations
//! - [`ports::PayloadStore`] - Store inscription content
//!
//! ## Pipeline
//!
//! The indexer walks the chain one height at a time. Every transaction
//! whose memo is a metaprotocol URN is persisted, then routed to the
//! processor registered under the URN's protocol name. Processors run
//! inside a savepoint, so a rejected operation leaves nothing behind but
//! the transaction row and its `status_message`.

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
pub mod urn;

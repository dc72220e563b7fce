//! Sellsy Lead Ingestion Library
//!
//! This library retrieves sales opportunities from the Sellsy CRM and turns them
//! into a normalized, analysis-ready lead dataset: authenticated paginated
//! retrieval, canonical pipeline and step labels, funnel stages, and French
//! department resolution from free text.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Normalization and reporting logic.
//! - `integrations`: Sellsy API clients.
//! - `assembler`: Raw opportunity to normalized lead transform.
//! - `circuit_breaker`: Circuit breaker around pipeline runs.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `geo`: Postal code extraction and department lookup.
//! - `handlers`: HTTP request handlers.
//! - `models`: Upstream and normalized data models.
//! - `normalizer`: Pipeline, step and workflow stage canonicalization.
//! - `paginator`: Opportunities list paging.
//! - `pipeline`: End-to-end ingestion run.
//! - `report`: Dataset filters and aggregates.
//! - `token`: OAuth2 client-credentials token cache.

pub mod api;
pub mod core;
pub mod integrations;

pub mod assembler;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod paginator;
pub mod pipeline;
pub mod report;
pub mod token;

//! # forge_cloudflare
//!
//! Delegates a subdomain of a Cloudflare-managed zone to another set of name
//! servers, typically a Route53 hosted zone.
//!
//! ## Example
//!
//! ```rust
//! use forge_cloudflare::{CloudflareNameserver, CloudflareNameserverConfig};
//! use forge_core::{Context, Environment, MockEngine, Output, ResourceOptions, Stack};
//!
//! let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
//! let config = CloudflareNameserverConfig::new(
//!     "shop.example.com",
//!     Output::known(vec!["ns-1.awsdns-01.org".to_string()]),
//! )
//! .with_zone_id("cf-zone-1");
//! let delegation = CloudflareNameserver::new(&stack, "shop-ns", &config, ResourceOptions::new()).unwrap();
//!
//! stack.settle(&MockEngine::new()).unwrap();
//! assert_eq!(delegation.nameserver_records.get().map(|r| r.len()), Some(1));
//! ```

pub mod nameserver;

pub use nameserver::{CloudflareNameserver, CloudflareNameserverConfig, ZoneInfo};

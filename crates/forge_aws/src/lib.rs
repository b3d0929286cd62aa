//! # forge_aws
//!
//! AWS components for cloudforge.
//!
//! Each component registers itself and its resources on a [`forge_core::Stack`]
//! and exposes typed handles to the values other components consume.
//!
//! ## Features
//!
//! - ECS Fargate services behind an HTTPS load balancer, with certificates,
//!   DNS aliases and least-privilege task roles
//! - VPC with private endpoints, Route53 zones and records
//! - S3 asset buckets with CloudFront, Secrets Manager secrets, SES identities
//! - Amplify apps, App Runner services, RDS instances, ECR repositories and
//!   image builds
//!
//! ## Example
//!
//! ```rust
//! use forge_aws::ecs::{EcsCluster, EcsDnsConfig, EcsHealthCheckConfig, EcsService, EcsServiceConfig};
//! use forge_aws::vpc::Vpc;
//! use forge_core::{Context, Environment, MockEngine, ResourceOptions, Stack};
//!
//! let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
//! let vpc = Vpc::new(&stack, "shop", ResourceOptions::new()).unwrap();
//! let cluster = EcsCluster::new(&stack, "shop", ResourceOptions::new()).unwrap();
//!
//! let config = EcsServiceConfig::new(
//!     "nginx:latest",
//!     80,
//!     EcsDnsConfig::new("api.dev.example.com", "Z123"),
//!     EcsHealthCheckConfig::new("/health"),
//! );
//! let service = EcsService::new("api", &cluster, &config, &vpc, ResourceOptions::new()).unwrap();
//!
//! stack.settle(&MockEngine::new()).unwrap();
//! assert!(service.url.get().unwrap().starts_with("https://"));
//! ```

pub mod amplify;
pub mod app_runner;
pub mod ecr;
pub mod ecs;
pub mod iam;
pub mod image;
pub mod rds;
pub mod route53;
pub mod s3;
pub mod secret;
pub mod ses;
pub mod vpc;

pub use amplify::{AmplifyApp, AmplifyAppConfig, AmplifyDomainAssociationConfig};
pub use app_runner::{AppRunnerImage, AppRunnerService, AppRunnerServiceConfig, ImageSource};
pub use ecr::{EcrRepository, EcrRepositoryConfig};
pub use ecs::{EcsCluster, EcsService, EcsServiceConfig};
pub use iam::{PolicyDocument, Statement};
pub use image::{build_image_uri, fetch_ecr_registry_authorization, DockerImage, DockerImageConfig, RegistryAuth};
pub use rds::{RdsConfig, RdsInstance};
pub use route53::{DnsRecord, HostedZone, HostedZoneConfig, ZoneLookup};
pub use s3::{S3Bucket, S3BucketConfig};
pub use secret::{Secret, SecretConfig};
pub use ses::{Ses, SesConfig, SesWithRoute53, SesWithRoute53Config};
pub use vpc::Vpc;

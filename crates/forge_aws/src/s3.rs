//! Private asset bucket served through CloudFront.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use forge_core::{props, tracked, Component, ForgeResult, Input, Output, Resource, ResourceOptions, Stack};

use crate::iam::{PolicyDocument, Statement};

pub const S3_BUCKET_COMPONENT: &str = "cloudforge:s3:S3Bucket";
pub const BUCKET: &str = "aws:s3/bucket:Bucket";
pub const BUCKET_POLICY: &str = "aws:s3/bucketPolicy:BucketPolicy";
pub const ORIGIN_ACCESS_IDENTITY: &str = "aws:cloudfront/originAccessIdentity:OriginAccessIdentity";
pub const DISTRIBUTION: &str = "aws:cloudfront/distribution:Distribution";

const ORIGIN_ID: &str = "assetS3Origin";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketConfig {
    pub name: String,
    /// Days before objects (and noncurrent versions) expire.
    #[serde(default)]
    pub content_expiration: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct S3Bucket {
    resource: Resource,
    pub asset_bucket: Resource,
    pub origin_access_identity: Resource,
    pub assets_cdn: Resource,
}

impl S3Bucket {
    pub fn new(stack: &Stack, config: &S3BucketConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        let name = config.name.as_str();
        info!("Creating asset bucket {}-assets", name);
        let resource = stack.register_component(S3_BUCKET_COMPONENT, name, opts)?;

        let asset_bucket = create_bucket(stack, name, config.content_expiration, &resource)?;

        let origin_access_identity = stack.register_resource(
            ORIGIN_ACCESS_IDENTITY,
            format!("{}-assets-oai", name),
            props! { "comment" => format!("OAI for {} assets", name) },
            ResourceOptions::child_of(&resource),
        )?;

        let policy = asset_bucket
            .arn()
            .zip(&origin_access_identity.output_string("iamArn"))
            .try_apply(|(bucket_arn, oai_arn)| {
                PolicyDocument::new(vec![Statement::allow("s3:GetObject")
                    .principal(json!({ "AWS": oai_arn }))
                    .on(format!("{}/*", bucket_arn))])
                .to_json()
            });
        stack.register_resource(
            BUCKET_POLICY,
            format!("{}-assets-bucket-policy", name),
            props! {
                "bucket" => asset_bucket.id(),
                "policy" => policy,
            },
            ResourceOptions::child_of(&asset_bucket),
        )?;

        let assets_cdn = create_distribution(stack, name, &asset_bucket, &origin_access_identity)?;

        stack.register_outputs(
            &resource,
            [
                ("assetBucket", tracked(&asset_bucket)),
                ("assetsCdn", tracked(&assets_cdn)),
            ],
        );
        Ok(Self {
            resource,
            asset_bucket,
            origin_access_identity,
            assets_cdn,
        })
    }

    /// Name of the bucket, for IAM grants.
    pub fn bucket_name(&self) -> Output<String> {
        self.asset_bucket.output_string("bucket")
    }

    pub fn cdn_domain_name(&self) -> Output<String> {
        self.assets_cdn.output_string("domainName")
    }
}

impl Component for S3Bucket {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

fn lifecycle_rules(content_expiration: Option<u32>) -> Input {
    match content_expiration.filter(|days| *days > 0) {
        Some(days) => Input::from(vec![props! {
            "enabled" => true,
            "expiration" => props! { "days" => days },
            "noncurrentVersionExpiration" => props! { "days" => days },
            "abortIncompleteMultipartUploadDays" => 7,
        }]),
        None => Input::null(),
    }
}

fn create_bucket(
    stack: &Stack,
    name: &str,
    content_expiration: Option<u32>,
    parent: &Resource,
) -> ForgeResult<Resource> {
    stack.register_resource(
        BUCKET,
        format!("{}-assets-bucket", name),
        props! {
            "bucket" => format!("{}-assets", name),
            "acl" => "private",
            "corsRules" => vec![props! {
                "allowedHeaders" => vec!["*"],
                "allowedMethods" => vec!["GET", "HEAD"],
                "allowedOrigins" => vec!["*"],
                "maxAgeSeconds" => 3000,
            }],
            "versioning" => props! { "enabled" => true },
            "lifecycleRules" => lifecycle_rules(content_expiration),
            "serverSideEncryptionConfiguration" => props! {
                "rule" => props! {
                    "applyServerSideEncryptionByDefault" => props! { "sseAlgorithm" => "AES256" },
                },
            },
            "tags" => stack.tags().with_component("S3"),
        },
        ResourceOptions::child_of(parent),
    )
}

fn create_distribution(
    stack: &Stack,
    name: &str,
    bucket: &Resource,
    origin_access_identity: &Resource,
) -> ForgeResult<Resource> {
    let methods = || vec!["GET", "HEAD", "OPTIONS"];
    stack.register_resource(
        DISTRIBUTION,
        format!("{}-assets-cdn", name),
        props! {
            "enabled" => true,
            "isIpv6Enabled" => true,
            "origins" => vec![props! {
                "domainName" => bucket.output_string("bucketRegionalDomainName"),
                "originId" => ORIGIN_ID,
                "s3OriginConfig" => props! {
                    "originAccessIdentity" => origin_access_identity.output_string("cloudfrontAccessIdentityPath"),
                },
            }],
            "defaultCacheBehavior" => props! {
                "allowedMethods" => methods(),
                "cachedMethods" => methods(),
                "targetOriginId" => ORIGIN_ID,
                "forwardedValues" => props! {
                    "queryString" => false,
                    "cookies" => props! { "forward" => "none" },
                },
                "viewerProtocolPolicy" => "redirect-to-https",
                "minTtl" => 0,
                "defaultTtl" => 86_400,
                "maxTtl" => 31_536_000,
            },
            "restrictions" => props! {
                "geoRestriction" => props! { "restrictionType" => "none" },
            },
            "viewerCertificate" => props! { "cloudfrontDefaultCertificate" => true },
            "tags" => stack.tags().with_component("CloudFront"),
        },
        ResourceOptions::child_of(bucket),
    )
}

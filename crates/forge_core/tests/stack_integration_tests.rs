//! Integration tests for composing and settling a stack.

use std::fs;

use forge_core::{
    build_service_domain_name, props, tracked, Context, ForgeError, MockEngine, Output, Plan, ResourceOptions,
    Stack, StackConfig,
};
use serde_json::json;
use tempfile::tempdir;

fn stack_from_file(content: &str) -> Stack {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Forge.prod.yaml");
    fs::write(&path, content).unwrap();
    let config = StackConfig::from_file(&path).unwrap();
    Stack::new(Context::from_config(&config).unwrap())
}

#[test]
fn test_context_drives_names_and_urns() {
    let stack = stack_from_file("project: shop\nstack: prod\nconfig:\n  region: eu-west-1\n  rootDomain: example.com\n");
    let ctx = stack.context();
    assert_eq!(build_service_domain_name(ctx, "api", None).unwrap(), "api.shop.example.com");

    let bucket = stack
        .register_resource(
            "aws:s3/bucket:Bucket",
            ctx.scoped("assets"),
            props! { "tags" => stack.tags() },
            ResourceOptions::new(),
        )
        .unwrap();
    assert_eq!(
        bucket.urn().as_str(),
        "urn:forge:prod::shop::aws:s3/bucket:Bucket::assets-prod"
    );

    let plan = stack.plan();
    let tags = &plan.resources[0].inputs["tags"];
    assert_eq!(tags["Environment"], "prod");
    assert_eq!(tags["ManagedBy"], "cloudforge");
}

#[test]
fn test_children_registered_while_settling() {
    let stack = stack_from_file("project: shop\nstack: dev\nconfig:\n  region: us-east-1\n");
    let zone = stack
        .register_resource(
            "aws:route53/zone:Zone",
            "zone",
            props! { "name" => "shop.example.com" },
            ResourceOptions::new(),
        )
        .unwrap();

    let parent = zone.clone();
    let records = zone.output("nameServers").strings().try_apply(move |servers| {
        servers
            .iter()
            .enumerate()
            .map(|(index, server)| {
                parent
                    .stack()
                    .register_resource(
                        "aws:route53/record:Record",
                        format!("ns-{}", index),
                        props! { "records" => vec![server], "zoneId" => parent.id() },
                        ResourceOptions::child_of(&parent),
                    )
                    .map(|record| record.urn().clone())
            })
            .collect::<Result<Vec<_>, ForgeError>>()
    });
    stack.register_outputs(&zone, [("records", tracked(&records))]);

    assert_eq!(stack.len(), 1);
    stack.settle(&MockEngine::new()).unwrap();
    assert_eq!(stack.len(), 5);

    let plan = stack.plan();
    let record = plan.find("ns-3").unwrap();
    assert_eq!(record.parent.as_ref(), Some(zone.urn()));
    assert_eq!(record.inputs["zoneId"], json!("zone-id"));
}

#[test]
fn test_failures_are_reported_together() {
    let stack = stack_from_file("project: shop\nstack: dev\nconfig:\n  region: us-east-1\n");
    let first: Output<String> = Output::failed("first lookup failed");
    let second: Output<String> = Output::failed("second lookup failed");
    stack
        .register_resource("test:index:A", "a", props! { "value" => &first }, ResourceOptions::new())
        .unwrap();
    stack
        .register_resource("test:index:B", "b", props! { "value" => &second }, ResourceOptions::new())
        .unwrap();

    match stack.settle(&MockEngine::new()) {
        Err(ForgeError::Deferred(failures)) => {
            assert_eq!(failures, vec!["first lookup failed", "second lookup failed"]);
        }
        other => panic!("expected deferred failures, got {:?}", other),
    }
}

#[test]
fn test_plan_file_round_trip() {
    let stack = stack_from_file("project: shop\nstack: dev\nconfig:\n  region: us-east-1\n");
    let lb = stack
        .register_resource("aws:lb/loadBalancer:LoadBalancer", "lb", props! {}, ResourceOptions::new())
        .unwrap();
    stack
        .register_resource(
            "aws:route53/record:Record",
            "alias",
            props! { "aliases" => vec![props! { "name" => lb.output_string("dnsName") }] },
            ResourceOptions::new().depends_on(&lb),
        )
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("plan.json");
    stack.plan().write_to(&path).unwrap();

    let loaded = Plan::from_file(&path).unwrap();
    let alias = loaded.find("alias").unwrap();
    assert!(!alias.is_known("aliases"));
    assert_eq!(alias.all_dependencies(), vec![lb.urn()]);
}

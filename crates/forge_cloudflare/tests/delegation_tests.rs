//! Delegating a Route53 zone from Cloudflare.

use forge_aws::route53::{HostedZone, HostedZoneConfig};
use forge_cloudflare::nameserver::DNS_RECORD;
use forge_cloudflare::{CloudflareNameserver, CloudflareNameserverConfig};
use forge_core::{Context, Environment, MockEngine, ResourceOptions, Stack};

#[test]
fn test_route53_zone_delegated_after_settle() {
    let stack = Stack::new(Context::new(Environment::Prod, "us-east-1", "shop"));
    let zone = HostedZone::new(
        &stack,
        "shop-zone",
        &HostedZoneConfig {
            name: "shop.example.com".to_string(),
            comment: None,
        },
        ResourceOptions::new(),
    )
    .unwrap();

    let config = CloudflareNameserverConfig::new("shop.example.com", zone.name_servers()).with_zone_id("cf-1");
    let delegation = CloudflareNameserver::new(&stack, "shop-ns", &config, ResourceOptions::new()).unwrap();
    assert!(stack.plan().of_type(DNS_RECORD).is_empty());

    stack.settle(&MockEngine::new()).unwrap();
    let plan = stack.plan();
    let records = plan.of_type(DNS_RECORD);
    assert_eq!(records.len(), 4);
    assert_eq!(delegation.nameserver_records.get().unwrap().len(), 4);
    assert_eq!(records[3].name, "shop-route53-ns-3");
    assert_eq!(records[3].input_str("content"), Some("ns-4.awsdns-04.net"));
}

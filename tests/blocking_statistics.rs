use oyster_rs::config::{BlockingConfig, ResolverConfig, TruncationConfig};
use oyster_rs::{BlockingMode, Resolver, REF_ID};

fn values_resolver() -> Resolver {
    let config = ResolverConfig {
        attributes: vec!["first".to_string(), "last".to_string()],
        blocking: BlockingConfig {
            mode: BlockingMode::Values,
            ..Default::default()
        },
        ..Default::default()
    };
    Resolver::new(config).expect("values config builds")
}

#[test]
fn hub_key_triggers_truncation() -> anyhow::Result<()> {
    let mut resolver = values_resolver();
    let records = (0..151)
        .map(|i| {
            let ref_id = format!("r{i:03}");
            let first = format!("F{i:03}");
            resolver.record([(REF_ID, ref_id.as_str()), ("first", first.as_str()), ("last", "Smith")])
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    resolver.ingest(records)?;

    let stats = resolver.statistics();
    assert_eq!(stats.queries, 151);
    // unions of 101..=150 earlier Smiths exceed the trigger
    assert_eq!(stats.truncations, 50);
    assert_eq!(stats.histogram.len(), 151);
    assert_eq!(stats.top_blocks[0], ("Smith".to_string(), 151));
    assert_eq!(stats.key_count, 152);
    assert_eq!(stats.unique_tokens, 151);
    assert_eq!(stats.max_block, 151);
    assert_eq!(stats.min_block, 1);

    let report = stats.to_string();
    assert!(report.contains("Top 10 blocks"));
    assert!(report.contains("Smith"));
    Ok(())
}

#[test]
fn truncation_keeps_a_third_up_to_the_cap() {
    use oyster_rs::model::{Encoding, IdentityRecord, Schema};
    use oyster_rs::BlockingIndex;
    use std::sync::Arc;

    let schema = Schema::new(["last"]).unwrap();
    let record = |ref_id: &str| {
        IdentityRecord::from_fields(
            Arc::clone(&schema),
            Encoding::Map,
            [(REF_ID, ref_id), ("last", "Smith")],
        )
        .unwrap()
    };

    let mut index = BlockingIndex::new(BlockingMode::Values, Vec::new(), TruncationConfig::default());
    for i in 0..400 {
        index.insert(&record(&format!("r{i:03}"))).unwrap();
    }
    // 400 / 3 = 133, capped at 100
    assert_eq!(index.candidates(&record("q")).len(), 100);

    let tight = TruncationConfig {
        trigger: 10,
        divisor: 2,
        cap: 100,
    };
    let mut index = BlockingIndex::new(BlockingMode::Values, Vec::new(), tight);
    for i in 0..30 {
        index.insert(&record(&format!("r{i:03}"))).unwrap();
    }
    let candidates = index.candidates(&record("q"));
    assert_eq!(candidates.len(), 15);
    assert_eq!(candidates[0], "r000");
}

#[test]
fn universal_mode_compares_everything() -> anyhow::Result<()> {
    let config = ResolverConfig::from_toml_str(
        r#"
attributes = ["name"]

[blocking]
mode = "universal"

[[matching.rules]]
id = "NAME"
terms = [{ attribute = "name", spec = "LED(0.8)" }]
"#,
    )?;
    let mut resolver = Resolver::new(config)?;
    resolver.ingest(vec![
        resolver.record([(REF_ID, "a"), ("name", "Jonathan")])?,
        resolver.record([(REF_ID, "b"), ("name", "Zebulon")])?,
        resolver.record([(REF_ID, "c"), ("name", "Jonathon")])?,
    ])?;
    assert_eq!(resolver.cluster_of("a"), resolver.cluster_of("c"));
    assert_ne!(resolver.cluster_of("a"), resolver.cluster_of("b"));
    assert_eq!(resolver.statistics().key_count, 1);
    Ok(())
}

use affinitygate_model::{AffinityConfig, OverloadPolicy, ResolverKind};

#[test]
fn test_parse_config() {
    let file = include_str!("test_parse_config/config.toml");
    let parse_result = toml::from_str::<AffinityConfig>(file);
    match parse_result {
        Ok(result) => {
            println!("{:#?}", result);
            assert_eq!(result.listen.port(), 9000);
            assert_eq!(result.header, "X-Session-Id");
            assert!(!result.keep_alive);
            assert!(result.no_forward);
            assert_eq!(result.resolver.kind, ResolverKind::BoundedLoad);
            assert_eq!(result.resolver.replicas, 40);
            assert_eq!(result.resolver.partitions, 0);
            assert_eq!(result.resolver.overload, OverloadPolicy::Reject);
            assert!(result.validate().is_ok());
        }
        Err(e) => {
            eprintln!("{}", e);
            if let Some(span) = e.span() {
                let bytes = file.as_bytes();
                let span_str = std::str::from_utf8(&bytes[span]).unwrap();
                eprintln!("{}", span_str);
            }
            panic!();
        }
    }
}

#[test]
fn test_parse_empty_config() {
    let config = toml::from_str::<AffinityConfig>("").expect("empty config should use defaults");
    assert_eq!(config, AffinityConfig::default());
}

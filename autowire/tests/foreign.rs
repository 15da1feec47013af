use autowire::{
    AutowireError, AutowiringError, Callable, CapabilityId, ContainerReflection, Contracts,
    DecoratorDefinition, GraphAssembler, ProviderDefinition, ProviderKind, ResolvedGraph, Scope,
    Signature,
};

struct Capabilities {
    pool: CapabilityId,
    config: CapabilityId,
    request: CapabilityId,
    storage: CapabilityId,
    api: CapabilityId,
}

fn declare(contracts: &mut Contracts) -> Capabilities {
    Capabilities {
        pool: contracts.declare("Pool"),
        config: contracts.declare("Config"),
        request: contracts.declare("Request"),
        storage: contracts.declare("Storage"),
        api: contracts.declare("Api"),
    }
}

/// Nested graph exposing `pool` and expecting `config` from outside.
fn nested(contracts: &Contracts, caps: &Capabilities, pool_async: bool) -> ResolvedGraph {
    let mut pool = Callable::new("Pool::new").param("config", Signature::of(caps.config));
    if pool_async {
        pool = pool.asynchronous();
    }
    let mut assembler = GraphAssembler::new("storage", contracts);
    assembler
        .add_provider(ProviderDefinition::factory("pool", caps.pool, pool).public())
        .unwrap();
    assembler
        .add_provider(ProviderDefinition::dynamic("config", caps.config))
        .unwrap();
    assembler
        .add_provider(ProviderDefinition::dynamic("request", caps.request).public())
        .unwrap();
    assembler.assemble().unwrap()
}

#[test]
fn test_reflection() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    let graph = nested(&contracts, &caps, true);
    let public: Vec<_> = graph
        .public_services()
        .into_iter()
        .map(|v| (v.id, v.is_async))
        .collect();
    assert_eq!(
        public,
        vec![("pool".to_owned(), true), ("request".to_owned(), false)]
    );
    let dynamic: Vec<_> = graph.dynamic_services().into_iter().map(|v| v.id).collect();
    assert_eq!(dynamic, vec!["config", "request"]);
}

#[test]
fn test_foreign_async_is_or() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    for (container_async, pool_async) in [(false, false), (true, false), (false, true), (true, true)]
    {
        let graph = nested(&contracts, &caps, pool_async);
        let mut factory = Callable::new("Storage::new");
        if container_async {
            factory = factory.asynchronous();
        }
        let mut assembler = GraphAssembler::new("app", &contracts);
        assembler
            .add_provider(ProviderDefinition::factory(
                "config",
                caps.config,
                Callable::new("Config::load"),
            ))
            .unwrap();
        assembler
            .add_container("storage", caps.storage, factory, &graph)
            .unwrap();
        assembler
            .add_provider(ProviderDefinition::factory(
                "api",
                caps.api,
                Callable::new("Api::new").param("pool", Signature::of(caps.pool)),
            ))
            .unwrap();
        let resolved = assembler.assemble().unwrap();

        let foreign = resolved.find("storage.pool").unwrap();
        assert!(matches!(
            &foreign.definition.kind,
            ProviderKind::Foreign { service, .. } if service == "pool"
        ));
        assert_eq!(foreign.is_async, container_async || pool_async);
        assert!(!foreign.definition.public);

        let api = resolved.find("api").unwrap();
        assert_eq!(api.plan.factory[0].targets()[0].provider, foreign.id);
        assert_eq!(api.is_async, container_async || pool_async);
    }
}

#[test]
fn test_dynamic_binding() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    let graph = nested(&contracts, &caps, false);

    let mut assembler = GraphAssembler::new("app", &contracts);
    assembler
        .add_provider(ProviderDefinition::factory(
            "config",
            caps.config,
            Callable::new("Config::load").asynchronous(),
        ))
        .unwrap();
    assembler
        .add_container("storage", caps.storage, Callable::new("Storage::new"), &graph)
        .unwrap();
    let resolved = assembler.assemble().unwrap();

    let storage = resolved.find("storage").unwrap();
    let config = resolved.find("config").unwrap();
    assert_eq!(storage.plan.registrations.len(), 1);
    assert_eq!(storage.plan.registrations[0].name, "config");
    assert_eq!(storage.plan.registrations[0].targets()[0].provider, config.id);
    // Filling the nested graph waits for the async config.
    assert!(storage.is_async);
    assert!(resolved.find("storage.pool").unwrap().is_async);
}

#[test]
fn test_ambiguous_dynamic_binding() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    let graph = nested(&contracts, &caps, false);

    let mut assembler = GraphAssembler::new("app", &contracts);
    for id in ["primary", "replica"] {
        assembler
            .add_provider(ProviderDefinition::factory(
                id,
                caps.config,
                Callable::new("Config::load"),
            ))
            .unwrap();
    }
    assembler
        .add_container("storage", caps.storage, Callable::new("Storage::new"), &graph)
        .unwrap();
    match assembler.assemble() {
        Err(AutowireError::Autowiring { context, error }) => {
            assert_eq!(context.provider.as_deref(), Some("storage"));
            assert_eq!(
                error,
                AutowiringError::AmbiguousDynamicBinding {
                    service: "config".into(),
                    capability: "Config".into(),
                    candidates: vec!["primary".into(), "replica".into()],
                }
            );
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("binding must be ambiguous"),
    }
}

#[test]
fn test_injector_into_foreign() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    let graph = nested(&contracts, &caps, false);

    let mut assembler = GraphAssembler::new("app", &contracts);
    assembler
        .add_container("storage", caps.storage, Callable::new("Storage::new"), &graph)
        .unwrap();
    assembler
        .add_provider(ProviderDefinition::factory(
            "api",
            caps.api,
            Callable::new("Api::new")
                .param("inject", Signature::injector(Signature::of(caps.request))),
        ))
        .unwrap();
    match assembler.assemble() {
        Err(AutowireError::Autowiring { error, .. }) => assert_eq!(
            error,
            AutowiringError::InjectorTargetForeign {
                dependency: "storage.request".into()
            }
        ),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("injector into a nested graph must fail"),
    }
}

#[test]
fn test_superseded_container_takes_its_services() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    let graph = nested(&contracts, &caps, true);

    let mut assembler = GraphAssembler::new("app", &contracts);
    assembler
        .add_provider(
            ProviderDefinition::container(
                "storage",
                caps.storage,
                Callable::new("Storage::new"),
                &graph,
            )
            .implicit(),
        )
        .unwrap();
    assembler
        .add_provider(ProviderDefinition::factory(
            "explicit_storage",
            caps.storage,
            Callable::new("make_storage"),
        ))
        .unwrap();
    let resolved = assembler.assemble().unwrap();

    assert!(resolved.find("storage").is_none());
    assert!(resolved.find("storage.pool").is_none());
    assert!(resolved.find("storage.request").is_none());
    assert_eq!(resolved.find_by_capability(caps.pool).count(), 0);
    let ids: Vec<_> = resolved.iter().map(|v| v.definition.id.as_str()).collect();
    assert_eq!(ids, vec!["explicit_storage"]);
}

#[test]
fn test_foreign_follows_container_scope_override() {
    let mut contracts = Contracts::new();
    let caps = declare(&mut contracts);
    let graph = nested(&contracts, &caps, false);

    let mut assembler = GraphAssembler::new("app", &contracts);
    assembler
        .add_container("storage", caps.storage, Callable::new("Storage::new"), &graph)
        .unwrap();
    assembler.add_decorator(
        DecoratorDefinition::new("per_request", caps.storage).scope(Scope::Local),
    );
    let resolved = assembler.assemble().unwrap();

    assert_eq!(resolved.find("storage").unwrap().scope, Scope::Local);
    assert_eq!(resolved.find("storage.pool").unwrap().scope, Scope::Local);
    assert_eq!(resolved.find("storage.request").unwrap().scope, Scope::Local);
}

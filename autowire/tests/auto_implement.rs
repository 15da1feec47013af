use autowire::{
    AutowireError, AutowiringError, Bridging, Callable, CapabilityId, Contracts,
    DecoratorDefinition, DefinitionError, GraphAssembler, HoistOrigin, InjectedValue, Method,
    ProviderDefinition, ResolvedGraph, Signature,
};

struct Fixture {
    contracts: Contracts,
    url: CapabilityId,
    pool: CapabilityId,
    tracer: CapabilityId,
    connection: CapabilityId,
    factory: CapabilityId,
    async_factory: CapabilityId,
    repository: CapabilityId,
}

impl Fixture {
    fn new() -> Self {
        let mut contracts = Contracts::new();
        let url = contracts.declare("Url");
        let pool = contracts.declare("Pool");
        let tracer = contracts.declare("Tracer");
        let connection = contracts.declare("Connection");
        let factory = contracts.declare_abstract(
            "ConnectionFactory",
            vec![
                Method::new("create", Signature::of(connection)).param(Signature::of(url)),
                Method::new("close_all", Signature::Unit).implemented(),
            ],
        );
        let async_factory = contracts.declare_abstract(
            "AsyncConnectionFactory",
            vec![
                Method::new("create", Signature::of(connection).deferred())
                    .param(Signature::of(url)),
            ],
        );
        let repository = contracts.declare("Repository");
        Self {
            contracts,
            url,
            pool,
            tracer,
            connection,
            factory,
            async_factory,
            repository,
        }
    }

    fn pool(&self, is_async: bool) -> ProviderDefinition {
        let mut factory = Callable::new("Pool::new");
        if is_async {
            factory = factory.asynchronous();
        }
        ProviderDefinition::factory("pool", self.pool, factory)
    }

    fn connection(&self, is_async: bool) -> ProviderDefinition {
        let mut factory = Callable::new("Connection::open")
            .param("url", Signature::of(self.url))
            .param("pool", Signature::of(self.pool));
        if is_async {
            factory = factory.asynchronous();
        }
        ProviderDefinition::factory("connection", self.connection, factory)
    }

    fn assemble(
        &self,
        definitions: Vec<ProviderDefinition>,
        decorators: Vec<DecoratorDefinition>,
    ) -> Result<ResolvedGraph, AutowireError> {
        let mut assembler = GraphAssembler::new("app", &self.contracts);
        for definition in definitions {
            assembler.add_provider(definition)?;
        }
        for decorator in decorators {
            assembler.add_decorator(decorator);
        }
        assembler.assemble()
    }
}

#[test]
fn test_forwarded_arguments() {
    let fixture = Fixture::new();
    let graph = fixture
        .assemble(
            vec![
                fixture.pool(false),
                fixture.connection(false),
                ProviderDefinition::auto_implemented("connections", fixture.factory),
            ],
            vec![],
        )
        .unwrap();
    let connections = graph.find("connections").unwrap();
    let connection = graph.find("connection").unwrap();
    assert!(!connections.is_async);
    let auto = connections.plan.auto.as_ref().unwrap();
    assert_eq!(auto.method, "create");
    assert_eq!(auto.target, connection.id);
    assert!(!auto.async_method);
    assert!(auto.target_plan.is_none());
    assert_eq!(connection.plan.factory[0].value, InjectedValue::Forwarded(0));
    assert_eq!(connection.plan.factory[1].targets().len(), 1);
}

#[test]
fn test_requires_factory_arguments() {
    let fixture = Fixture::new();
    let result = fixture.assemble(
        vec![
            fixture.pool(false),
            fixture.connection(false),
            ProviderDefinition::auto_implemented("connections", fixture.factory),
            ProviderDefinition::factory(
                "repository",
                fixture.repository,
                Callable::new("Repository::new")
                    .param("connection", Signature::of(fixture.connection)),
            ),
        ],
        vec![],
    );
    match result {
        Err(AutowireError::Autowiring { context, error }) => {
            assert_eq!(context.provider.as_deref(), Some("repository"));
            assert_eq!(
                error,
                AutowiringError::RequiresFactoryArguments {
                    dependency: "connection".into()
                }
            );
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("direct injection must fail"),
    }
}

#[test]
fn test_hoisting() {
    let fixture = Fixture::new();
    let graph = fixture
        .assemble(
            vec![
                fixture.pool(true),
                fixture.connection(false),
                ProviderDefinition::auto_implemented("connections", fixture.factory),
            ],
            vec![],
        )
        .unwrap();
    let connection = graph.find("connection").unwrap();
    let connections = graph.find("connections").unwrap();
    // The pool is awaited once when the factory is created.
    assert!(connections.is_async);
    assert!(connection.is_async);
    assert_eq!(connections.plan.hoisted.len(), 1);
    let hoisted = &connections.plan.hoisted[0];
    assert_eq!(hoisted.name, "connection.pool");
    assert_eq!(hoisted.target, connection.id);
    assert_eq!(hoisted.origin, HoistOrigin::Factory);
    assert_eq!(hoisted.injection.targets()[0].bridging, Bridging::AwaitThenUse);

    let target_plan = connections
        .plan
        .auto
        .as_ref()
        .and_then(|v| v.target_plan.as_ref())
        .unwrap();
    assert_eq!(target_plan.factory[0].value, InjectedValue::Forwarded(0));
    assert_eq!(
        target_plan.factory[1].value,
        InjectedValue::Hoisted("connection.pool".into())
    );
    // The target's own plan is left intact.
    assert_eq!(connection.plan.factory[1].targets()[0].bridging, Bridging::AwaitThenUse);
}

#[test]
fn test_hoisting_decorator_arguments() {
    let fixture = Fixture::new();
    let graph = fixture
        .assemble(
            vec![
                fixture.pool(false),
                fixture.connection(false),
                ProviderDefinition::auto_implemented("connections", fixture.factory),
                ProviderDefinition::factory(
                    "tracer",
                    fixture.tracer,
                    Callable::new("Tracer::new").asynchronous(),
                ),
            ],
            vec![DecoratorDefinition::new("tracing", fixture.connection).decorate(
                Callable::new("trace")
                    .param("connection", Signature::of(fixture.connection))
                    .param("tracer", Signature::of(fixture.tracer)),
            )],
        )
        .unwrap();
    let connections = graph.find("connections").unwrap();
    assert!(connections.is_async);
    assert_eq!(connections.plan.hoisted.len(), 1);
    let hoisted = &connections.plan.hoisted[0];
    assert_eq!(hoisted.name, "tracing.tracer");
    assert!(matches!(hoisted.origin, HoistOrigin::Decorator(_)));
}

#[test]
fn test_async_target_with_sync_method() {
    let fixture = Fixture::new();
    let result = fixture.assemble(
        vec![
            fixture.pool(false),
            fixture.connection(true),
            ProviderDefinition::auto_implemented("connections", fixture.factory),
        ],
        vec![],
    );
    match result {
        Err(AutowireError::Autowiring { error, .. }) => assert_eq!(
            error,
            AutowiringError::AsyncAutoImplementation {
                method: "create".into(),
                target: "connection".into(),
            }
        ),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("async target must be rejected"),
    }

    let result = fixture.assemble(
        vec![
            fixture.pool(false),
            fixture.connection(false),
            ProviderDefinition::auto_implemented("connections", fixture.factory),
        ],
        vec![DecoratorDefinition::new("warmup", fixture.connection).decorate(
            Callable::new("warmup")
                .param("connection", Signature::of(fixture.connection))
                .asynchronous(),
        )],
    );
    assert!(matches!(
        result,
        Err(AutowireError::Autowiring {
            error: AutowiringError::AsyncAutoImplementation { .. },
            ..
        })
    ));
}

#[test]
fn test_creation_hook_awaits_hoisted_dependency() {
    let fixture = Fixture::new();
    let connection = fixture.connection(false).on_create(
        Callable::new("Connection::register")
            .param("connection", Signature::of(fixture.connection))
            .param("pool", Signature::of(fixture.pool)),
    );
    let result = fixture.assemble(
        vec![
            fixture.pool(true),
            connection,
            ProviderDefinition::auto_implemented("connections", fixture.factory),
        ],
        vec![],
    );
    match result {
        Err(AutowireError::Autowiring { error, .. }) => assert_eq!(
            error,
            AutowiringError::AsyncAutoImplementation {
                method: "create".into(),
                target: "connection".into(),
            }
        ),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("creation hook awaits the pool on every call"),
    }
}

#[test]
fn test_async_method() {
    let fixture = Fixture::new();
    for (target_async, bridging) in [(true, Bridging::None), (false, Bridging::WrapAsAsync)] {
        let graph = fixture
            .assemble(
                vec![
                    fixture.pool(false),
                    fixture.connection(target_async),
                    ProviderDefinition::auto_implemented("connections", fixture.async_factory),
                ],
                vec![],
            )
            .unwrap();
        let connections = graph.find("connections").unwrap();
        assert!(!connections.is_async);
        let auto = connections.plan.auto.as_ref().unwrap();
        assert!(auto.async_method);
        assert_eq!(auto.bridging, bridging);
        assert!(connections.plan.hoisted.is_empty());
    }
}

#[test]
fn test_target_depends_on_its_factory() {
    let fixture = Fixture::new();
    let connection = ProviderDefinition::factory(
        "connection",
        fixture.connection,
        Callable::new("Connection::open")
            .param("url", Signature::of(fixture.url))
            .param("factory", Signature::of(fixture.factory)),
    );
    let graph = fixture
        .assemble(
            vec![
                ProviderDefinition::auto_implemented("connections", fixture.factory),
                connection,
            ],
            vec![],
        )
        .unwrap();
    assert_eq!(graph.find("connections").unwrap().visits, 1);
    assert_eq!(graph.find("connection").unwrap().visits, 1);
}

#[test]
fn test_not_auto_implementable() {
    let mut fixture = Fixture::new();
    let broken = fixture.contracts.declare_abstract(
        "Broken",
        vec![
            Method::new("first", Signature::of(fixture.pool)),
            Method::new("second", Signature::of(fixture.pool)),
        ],
    );
    let result = fixture.assemble(
        vec![
            fixture.pool(false),
            ProviderDefinition::auto_implemented("broken", broken),
        ],
        vec![],
    );
    match result {
        Err(AutowireError::Definition { context, error }) => {
            assert_eq!(context.provider.as_deref(), Some("broken"));
            assert_eq!(
                error,
                DefinitionError::NotAutoImplementable {
                    contract: "Broken".into()
                }
            );
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("contract must be rejected"),
    }
}

#[test]
fn test_conflicting_auto_implementations() {
    let mut fixture = Fixture::new();
    let other = fixture.contracts.declare_abstract(
        "PooledConnectionFactory",
        vec![
            Method::new("create", Signature::of(fixture.connection))
                .param(Signature::of(fixture.pool)),
        ],
    );
    let result = fixture.assemble(
        vec![
            fixture.pool(false),
            fixture.connection(false),
            ProviderDefinition::auto_implemented("connections", fixture.factory),
            ProviderDefinition::auto_implemented("pooled", other),
        ],
        vec![],
    );
    assert!(matches!(
        result,
        Err(AutowireError::Definition {
            error: DefinitionError::ConflictingAutoImplementation { .. },
            ..
        })
    ));
}

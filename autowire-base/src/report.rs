//! Serializable form of a resolved graph.
//!
//! A report carries everything an emitter needs and doubles as the
//! reflection of a compiled graph when it is nested in another one.

use std::collections::BTreeMap;
use std::path::Path;

use autowire::{
    AppliedDecorator, AutoImplementation, HoistOrigin, HookPlan, InjectedValue, Injection,
    ProviderId, ProviderKind, ProviderPlan, ResolvedGraph,
};
use serde::{Deserialize, Serialize};

use crate::{ContractDecl, ContractTable, StdError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphReport {
    pub name: String,
    /// Every contract the services refer to, by key.
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractDecl>,
    pub services: Vec<ServiceReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<DecoratorReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub id: String,
    pub kind: String,
    pub capability: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub scope: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub injected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    #[serde(flatten)]
    pub plan: PlanReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<AutoReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hoisted: Vec<HoistedReport>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<InjectionReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorated_by: Vec<AppliedDecoratorReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registrations: Vec<InjectionReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionReport {
    pub name: String,
    pub mode: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub rest: bool,
    #[serde(default)]
    pub async_wanted: bool,
    pub value: ValueReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueReport {
    Absent,
    Providers { targets: Vec<TargetReport> },
    Injector { service: String },
    Tuple { slots: Vec<InjectionReport> },
    ScopedExecution,
    Forwarded { position: usize },
    Hoisted { name: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub service: String,
    pub bridging: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookReport {
    pub kind: String,
    pub arguments: Vec<InjectionReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDecoratorReport {
    pub decorator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<InjectionReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReport {
    pub method: String,
    pub target: String,
    #[serde(default)]
    pub async_method: bool,
    pub bridging: String,
    /// Plan of the target with hoisted arguments substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_plan: Option<PlanReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoistedReport {
    pub name: String,
    pub target: String,
    /// Decorator id, or `None` for the target's factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decorator: Option<String>,
    pub argument: InjectionReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratorReport {
    pub id: String,
    pub target: String,
    pub priority: i32,
}

impl GraphReport {
    pub fn new(graph: &ResolvedGraph, table: &ContractTable) -> Self {
        let writer = ReportWriter { graph, table };
        Self {
            name: graph.name().to_owned(),
            contracts: table.declarations().clone(),
            services: graph.iter().map(|v| writer.service(v)).collect(),
            decorators: graph
                .decorators()
                .iter()
                .map(|v| DecoratorReport {
                    id: v.id.clone(),
                    target: table.key(v.target).to_owned(),
                    priority: v.priority,
                })
                .collect(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|v| v.id == id)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, StdError> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }

    pub async fn write_file(&self, path: impl AsRef<Path>, pretty: bool) -> Result<(), StdError> {
        tokio::fs::write(path, self.to_json(pretty)?).await?;
        Ok(())
    }
}

struct ReportWriter<'a> {
    graph: &'a ResolvedGraph,
    table: &'a ContractTable,
}

impl ReportWriter<'_> {
    fn service_id(&self, id: ProviderId) -> String {
        self.graph
            .get(id)
            .map_or_else(|| format!("#{}", id.index()), |v| v.definition.id.clone())
    }

    fn service(&self, provider: &autowire::ResolvedProvider) -> ServiceReport {
        let definition = &provider.definition;
        ServiceReport {
            id: definition.id.clone(),
            kind: definition.kind.as_str().to_owned(),
            capability: self.table.key(definition.capability).to_owned(),
            aliases: definition
                .aliases
                .iter()
                .map(|v| self.table.key(*v).to_owned())
                .collect(),
            scope: provider.scope.to_string(),
            public: definition.public,
            is_async: provider.is_async,
            injected: provider.injected,
            factory: match &definition.kind {
                ProviderKind::Foreign { service, .. } => Some(service.clone()),
                kind => kind.factory().map(|v| v.name.clone()),
            },
            plan: self.plan(&provider.plan),
            auto: provider.plan.auto.as_ref().map(|v| self.auto(v)),
            hoisted: provider
                .plan
                .hoisted
                .iter()
                .map(|v| HoistedReport {
                    name: v.name.clone(),
                    target: self.service_id(v.target),
                    decorator: match v.origin {
                        HoistOrigin::Factory => None,
                        HoistOrigin::Decorator(id) => Some(self.graph.decorator(id).id.clone()),
                    },
                    argument: self.injection(&v.injection),
                })
                .collect(),
        }
    }

    fn plan(&self, plan: &ProviderPlan) -> PlanReport {
        PlanReport {
            arguments: self.injections(&plan.factory),
            hooks: self.hooks(&plan.hooks),
            decorated_by: plan.decorators.iter().map(|v| self.decorator(v)).collect(),
            registrations: self.injections(&plan.registrations),
        }
    }

    fn auto(&self, auto: &AutoImplementation) -> AutoReport {
        AutoReport {
            method: auto.method.clone(),
            target: self.service_id(auto.target),
            async_method: auto.async_method,
            bridging: auto.bridging.as_str().to_owned(),
            target_plan: auto.target_plan.as_deref().map(|v| self.plan(v)),
        }
    }

    fn decorator(&self, applied: &AppliedDecorator) -> AppliedDecoratorReport {
        AppliedDecoratorReport {
            decorator: self.graph.decorator(applied.decorator).id.clone(),
            arguments: self.injections(&applied.decorate),
            hooks: self.hooks(&applied.hooks),
        }
    }

    fn hooks(&self, hooks: &[HookPlan]) -> Vec<HookReport> {
        hooks
            .iter()
            .map(|v| HookReport {
                kind: v.kind.as_str().to_owned(),
                arguments: self.injections(&v.args),
            })
            .collect()
    }

    fn injections(&self, injections: &[Injection]) -> Vec<InjectionReport> {
        injections.iter().map(|v| self.injection(v)).collect()
    }

    fn injection(&self, injection: &Injection) -> InjectionReport {
        let value = match &injection.value {
            InjectedValue::Absent => ValueReport::Absent,
            InjectedValue::Providers(targets) => ValueReport::Providers {
                targets: targets
                    .iter()
                    .map(|v| TargetReport {
                        service: self.service_id(v.provider),
                        bridging: v.bridging.as_str().to_owned(),
                    })
                    .collect(),
            },
            InjectedValue::Injector(id) => ValueReport::Injector {
                service: self.service_id(*id),
            },
            InjectedValue::Tuple(slots) => ValueReport::Tuple {
                slots: self.injections(slots),
            },
            InjectedValue::ScopedExecution => ValueReport::ScopedExecution,
            InjectedValue::Forwarded(position) => ValueReport::Forwarded {
                position: *position,
            },
            InjectedValue::Hoisted(name) => ValueReport::Hoisted { name: name.clone() },
        };
        InjectionReport {
            name: injection.name.clone(),
            mode: injection.mode.as_str().to_owned(),
            optional: injection.optional,
            rest: injection.rest,
            async_wanted: injection.async_wanted,
            value,
        }
    }
}

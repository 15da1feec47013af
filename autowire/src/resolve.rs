//! The resolution engine.
//!
//! A provider is visited at most once. Visiting it resolves every injection
//! point of its factory, hooks, decorators and nested-graph registrations,
//! recursively visiting the candidates first. Asynchrony is not known during
//! the visit; the visit records the facts it is derived from instead.

use crate::asynchrony::{AsyncCell, AsyncTerm};
use crate::chain::DependencyChain;
use crate::foreign::SubRegistration;
use crate::graph::{SyncConstraint, Visit};
use crate::inject::{UnwrapError, Unwrapped, unwrap};
use crate::{
    AppliedDecorator, AutoImplementation, AutowireError, AutowiringError, Bridging, CapabilityId,
    Contracts, DecoratorId, DefinitionError, DefinitionGraph, HookKind, HookPlan, Hooks,
    InjectedValue, Injection, InjectionMode, InternalError, Param, ProviderDefinition, ProviderId,
    ProviderKind, ProviderPlan, Scope, Signature, Target,
};

pub(crate) struct Resolver<'a> {
    contracts: &'a Contracts,
    graph: &'a mut DefinitionGraph,
    chain: DependencyChain,
}

/// The provider an injection point belongs to.
#[derive(Clone, Debug)]
struct Site {
    provider: ProviderId,
    scope: Scope,
    argument: String,
}

impl Site {
    fn nested(&self, argument: String) -> Self {
        Self {
            argument,
            ..self.clone()
        }
    }
}

/// Asynchrony facts collected while visiting one provider.
#[derive(Default)]
struct Facts {
    terms: Vec<AsyncTerm>,
    hoistable: Vec<ProviderId>,
    /// Providers awaited outside factory and decorator arguments.
    fixed: Vec<ProviderId>,
    constraints: Vec<SyncConstraint>,
    /// Set while resolving factory and decorator arguments.
    hoisting: bool,
}

impl Facts {
    fn term(&mut self, term: AsyncTerm) {
        if !self.terms.contains(&term) {
            self.terms.push(term);
        }
    }

    fn inherent(&mut self) {
        self.term(AsyncTerm::Inherent);
    }

    fn awaits(&mut self, id: ProviderId) {
        self.term(AsyncTerm::Awaits(id));
        let awaited = if self.hoisting {
            &mut self.hoistable
        } else {
            &mut self.fixed
        };
        if !awaited.contains(&id) {
            awaited.push(id);
        }
    }
}

impl<'a> Resolver<'a> {
    pub fn new(contracts: &'a Contracts, graph: &'a mut DefinitionGraph) -> Self {
        Self {
            contracts,
            graph,
            chain: DependencyChain::new(),
        }
    }

    /// Visits `id` unless it has been visited already.
    pub fn visit(&mut self, id: ProviderId) -> Result<(), AutowireError> {
        let state = self.graph.state(id);
        if state.removed {
            return Ok(());
        }
        match state.visit {
            Visit::Done => return Ok(()),
            // Reached again through deferred consumption.
            Visit::InProgress if !self.chain.contains(id) => return Ok(()),
            _ => {}
        }
        self.chain.push(id).map_err(|v| self.cycle(v))?;
        let state = self.graph.state_mut(id);
        state.visit = Visit::InProgress;
        state.visits += 1;
        tracing::trace!(
            graph = %self.graph.name(),
            provider = %self.graph.definition(id).id,
            "Resolve service"
        );
        let (plan, facts) = self.resolve_definition(id)?;
        self.chain.pop(id).map_err(|v| self.mismatch(id, v))?;
        let state = self.graph.state_mut(id);
        state.plan = plan;
        state.asynchrony = AsyncCell::pending(facts.terms, facts.hoistable, facts.fixed);
        state.constraints = facts.constraints;
        state.visit = Visit::Done;
        Ok(())
    }

    /// Whether every frame opened during the pass has been closed.
    pub fn is_idle(&self) -> bool {
        self.chain.is_empty()
    }

    fn resolve_definition(
        &mut self,
        id: ProviderId,
    ) -> Result<(ProviderPlan, Facts), AutowireError> {
        let definition = self.graph.definition(id).clone();
        let scope = self.graph.scope(id);
        let mut plan = ProviderPlan::default();
        let mut facts = Facts::default();
        match &definition.kind {
            ProviderKind::Factory(factory) | ProviderKind::Container { factory, .. } => {
                if factory.is_async {
                    facts.inherent();
                }
                let forwarded = self.graph.state(id).forwarded.clone();
                facts.hoisting = true;
                plan.factory = self.resolve_params(
                    id,
                    scope,
                    None,
                    &factory.params,
                    forwarded.as_deref(),
                    &mut facts,
                )?;
                facts.hoisting = false;
            }
            ProviderKind::Dynamic => {}
            ProviderKind::AutoImplemented => {
                plan.auto = Some(self.resolve_auto(id, scope, &definition, &mut facts)?);
            }
            ProviderKind::Foreign {
                container,
                is_async,
                ..
            } => {
                self.visit(*container)?;
                facts.awaits(*container);
                if *is_async {
                    facts.inherent();
                }
            }
        }
        plan.hooks = self.resolve_hooks(id, scope, None, &definition.hooks, &mut facts)?;
        for decorator in self.graph.state(id).decorators.clone() {
            let applied = self.resolve_decorator(id, scope, decorator, &mut facts)?;
            plan.decorators.push(applied);
        }
        for registration in self.graph.state(id).bindings.clone() {
            let injection = self.resolve_registration(id, scope, &registration, &mut facts)?;
            plan.registrations.push(injection);
        }
        Ok((plan, facts))
    }

    fn resolve_params(
        &mut self,
        provider: ProviderId,
        scope: Scope,
        prefix: Option<&str>,
        params: &[Param],
        forwarded: Option<&[Signature]>,
        facts: &mut Facts,
    ) -> Result<Vec<Injection>, AutowireError> {
        let forwarded = forwarded.unwrap_or_default();
        let mut used = vec![false; forwarded.len()];
        let mut injections = Vec::with_capacity(params.len());
        for param in params {
            let position = forwarded
                .iter()
                .enumerate()
                .position(|(i, v)| !used[i] && *v == param.signature);
            if let Some(position) = position {
                used[position] = true;
                injections.push(Injection {
                    name: param.name.clone(),
                    mode: InjectionMode::Single,
                    optional: false,
                    rest: param.rest,
                    async_wanted: false,
                    value: InjectedValue::Forwarded(position),
                });
                continue;
            }
            let argument = match prefix {
                Some(prefix) => format!("{prefix}.{}", param.name),
                None => param.name.clone(),
            };
            let site = Site {
                provider,
                scope,
                argument,
            };
            let mut injection = self.resolve_point(&site, &param.signature, param.rest, facts)?;
            injection.name = param.name.clone();
            injections.push(injection);
        }
        Ok(injections)
    }

    fn resolve_point(
        &mut self,
        site: &Site,
        signature: &Signature,
        rest: bool,
        facts: &mut Facts,
    ) -> Result<Injection, AutowireError> {
        let unwrapped = unwrap(signature, rest).map_err(|e| self.unwrap_error(site, signature, e))?;
        let value = match (unwrapped.mode, unwrapped.capability) {
            (InjectionMode::ScopedExecutionHandle, _) => InjectedValue::ScopedExecution,
            (InjectionMode::Tuple, _) => {
                InjectedValue::Tuple(self.resolve_tuple(site, &unwrapped.slots, facts)?)
            }
            (InjectionMode::InjectorCallback, Some(capability)) => {
                self.resolve_injector(site, capability, unwrapped.async_wanted, facts)?
            }
            (_, Some(capability)) => self.resolve_candidates(site, &unwrapped, capability, facts)?,
            (_, None) => {
                return Err(self.unwrap_error(
                    site,
                    signature,
                    UnwrapError::Unsupported("expected a capability"),
                ));
            }
        };
        Ok(Injection {
            name: site.argument.clone(),
            mode: unwrapped.mode,
            optional: unwrapped.optional,
            rest,
            async_wanted: unwrapped.async_wanted,
            value,
        })
    }

    fn resolve_tuple(
        &mut self,
        site: &Site,
        slots: &[Signature],
        facts: &mut Facts,
    ) -> Result<Vec<Injection>, AutowireError> {
        let mut injections = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            let site = site.nested(format!("{}[{index}]", site.argument));
            let mut injection = self
                .resolve_point(&site, slot, false, facts)
                .map_err(|e| match e {
                    AutowireError::Autowiring { context, error } => AutowireError::Autowiring {
                        context,
                        error: AutowiringError::TupleSlot {
                            index,
                            error: Box::new(error),
                        },
                    },
                    e => e,
                })?;
            injection.name = index.to_string();
            injections.push(injection);
        }
        Ok(injections)
    }

    fn resolve_candidates(
        &mut self,
        site: &Site,
        unwrapped: &Unwrapped,
        capability: CapabilityId,
        facts: &mut Facts,
    ) -> Result<InjectedValue, AutowireError> {
        let mode = unwrapped.mode;
        let candidates = self.graph.index().find(capability).to_vec();
        if candidates.is_empty() {
            if mode.accepts_many() {
                return Ok(InjectedValue::Providers(Vec::new()));
            }
            if unwrapped.optional {
                return Ok(InjectedValue::Absent);
            }
            return Err(self.autowiring(
                site,
                AutowiringError::MissingCandidate {
                    capability: self.contracts.name(capability).to_owned(),
                },
            ));
        }
        if candidates.len() > 1 && !mode.accepts_many() {
            return Err(self.ambiguous(site, capability, &candidates));
        }
        let deferred = mode.is_deferred();
        if deferred {
            self.chain.open();
        }
        for candidate in &candidates {
            self.check_direct_creation(site, *candidate)?;
            self.visit(*candidate)?;
        }
        if deferred {
            self.chain.close().map_err(|v| self.frame_mismatch(v))?;
        }
        let mut targets = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.check_scope(site, candidate, mode)?;
            if deferred {
                if !unwrapped.async_wanted {
                    facts.constraints.push(SyncConstraint {
                        argument: site.argument.clone(),
                        dependency: candidate,
                        mode,
                    });
                }
            } else if !unwrapped.async_wanted {
                facts.awaits(candidate);
            }
            targets.push(Target::new(candidate));
        }
        Ok(InjectedValue::Providers(targets))
    }

    fn resolve_injector(
        &mut self,
        site: &Site,
        capability: CapabilityId,
        async_wanted: bool,
        facts: &mut Facts,
    ) -> Result<InjectedValue, AutowireError> {
        let candidates = self.graph.index().find(capability).to_vec();
        let candidate = match candidates.as_slice() {
            [] => {
                return Err(self.autowiring(
                    site,
                    AutowiringError::UnknownInjectorCapability {
                        capability: self.contracts.name(capability).to_owned(),
                    },
                ));
            }
            [v] => *v,
            _ => return Err(self.ambiguous(site, capability, &candidates)),
        };
        let definition = self.graph.definition(candidate);
        let dependency = definition.id.clone();
        if definition.is_foreign() {
            return Err(self.autowiring(site, AutowiringError::InjectorTargetForeign { dependency }));
        }
        if !definition.is_dynamic() {
            return Err(
                self.autowiring(site, AutowiringError::InjectorTargetNotDynamic { dependency })
            );
        }
        if self.graph.scope(candidate) == Scope::Private {
            return Err(self.autowiring(site, AutowiringError::InjectorTargetPrivate { dependency }));
        }
        self.graph.state_mut(candidate).injected = true;
        if !async_wanted {
            facts.constraints.push(SyncConstraint {
                argument: site.argument.clone(),
                dependency: candidate,
                mode: InjectionMode::InjectorCallback,
            });
        }
        Ok(InjectedValue::Injector(candidate))
    }

    fn resolve_hooks(
        &mut self,
        provider: ProviderId,
        scope: Scope,
        prefix: Option<&str>,
        hooks: &Hooks,
        facts: &mut Facts,
    ) -> Result<Vec<HookPlan>, AutowireError> {
        let mut plans = Vec::new();
        for (kind, hook) in hooks.iter() {
            let hook_prefix = match prefix {
                Some(prefix) => format!("{prefix}.{}", kind.as_str()),
                None => kind.as_str().to_owned(),
            };
            // Only creation hooks run while the instance is being constructed.
            let mut hook_facts = Facts::default();
            let args = self.resolve_params(
                provider,
                scope,
                Some(&hook_prefix),
                instance_params(&hook.params),
                None,
                &mut hook_facts,
            )?;
            if kind == HookKind::OnCreate {
                if hook.is_async {
                    facts.inherent();
                }
                for term in hook_facts.terms {
                    facts.term(term);
                }
                for id in hook_facts.fixed {
                    if !facts.fixed.contains(&id) {
                        facts.fixed.push(id);
                    }
                }
            }
            facts.constraints.extend(hook_facts.constraints);
            plans.push(HookPlan { kind, args });
        }
        Ok(plans)
    }

    fn resolve_decorator(
        &mut self,
        provider: ProviderId,
        scope: Scope,
        id: DecoratorId,
        facts: &mut Facts,
    ) -> Result<AppliedDecorator, AutowireError> {
        let decorator = self.graph.decorator(id).clone();
        let mut decorate = Vec::new();
        if let Some(callable) = &decorator.decorate {
            if callable.is_async {
                facts.inherent();
            }
            facts.hoisting = true;
            decorate = self.resolve_params(
                provider,
                scope,
                Some(&decorator.id),
                decorator.decorate_params(),
                None,
                facts,
            )?;
            facts.hoisting = false;
        }
        let hooks = self.resolve_hooks(provider, scope, Some(&decorator.id), &decorator.hooks, facts)?;
        Ok(AppliedDecorator {
            decorator: id,
            decorate,
            hooks,
        })
    }

    fn resolve_registration(
        &mut self,
        container: ProviderId,
        scope: Scope,
        registration: &SubRegistration,
        facts: &mut Facts,
    ) -> Result<Injection, AutowireError> {
        let site = Site {
            provider: container,
            scope,
            argument: registration.service.clone(),
        };
        self.check_direct_creation(&site, registration.provider)?;
        self.visit(registration.provider)?;
        self.check_scope(&site, registration.provider, InjectionMode::Single)?;
        facts.awaits(registration.provider);
        Ok(Injection {
            name: registration.service.clone(),
            mode: InjectionMode::Single,
            optional: false,
            rest: false,
            async_wanted: false,
            value: InjectedValue::Providers(vec![Target::new(registration.provider)]),
        })
    }

    fn resolve_auto(
        &mut self,
        id: ProviderId,
        scope: Scope,
        definition: &ProviderDefinition,
        facts: &mut Facts,
    ) -> Result<AutoImplementation, AutowireError> {
        let method = auto_method(self.contracts, definition).ok_or_else(|| {
            AutowireError::Definition {
                context: self.graph.context(id),
                error: DefinitionError::NotAutoImplementable {
                    contract: self.contracts.name(definition.capability).to_owned(),
                },
            }
        })?;
        let site = Site {
            provider: id,
            scope,
            argument: method.name.clone(),
        };
        let (async_method, returns) = match &method.returns {
            Signature::Deferred(v) => (true, v.as_ref()),
            v => (false, v),
        };
        let &Signature::Capability(capability) = returns else {
            return Err(self.unwrap_error(
                &site,
                &method.returns,
                UnwrapError::Unsupported("auto-implemented methods return a capability"),
            ));
        };
        let candidates = self.graph.index().find(capability).to_vec();
        let target = match candidates.as_slice() {
            [] => {
                return Err(self.autowiring(
                    &site,
                    AutowiringError::MissingCandidate {
                        capability: self.contracts.name(capability).to_owned(),
                    },
                ));
            }
            [v] => *v,
            _ => return Err(self.ambiguous(&site, capability, &candidates)),
        };
        // The target is created when the method is called, not now.
        self.chain.open();
        self.visit(target)?;
        self.chain.close().map_err(|v| self.frame_mismatch(v))?;
        if !async_method {
            facts.term(AsyncTerm::Hoists(target));
        }
        Ok(AutoImplementation {
            method: method.name.clone(),
            target,
            async_method,
            bridging: Bridging::None,
            target_plan: None,
        })
    }

    fn check_scope(
        &self,
        site: &Site,
        candidate: ProviderId,
        mode: InjectionMode,
    ) -> Result<(), AutowireError> {
        if site.scope == Scope::Global
            && self.graph.scope(candidate) == Scope::Local
            && mode != InjectionMode::Accessor
        {
            return Err(self.autowiring(
                site,
                AutowiringError::ScopeViolation {
                    dependency: self.graph.definition(candidate).id.clone(),
                },
            ));
        }
        Ok(())
    }

    fn check_direct_creation(&self, site: &Site, candidate: ProviderId) -> Result<(), AutowireError> {
        match &self.graph.state(candidate).forwarded {
            Some(forwarded) if !forwarded.is_empty() => Err(self.autowiring(
                site,
                AutowiringError::RequiresFactoryArguments {
                    dependency: self.graph.definition(candidate).id.clone(),
                },
            )),
            _ => Ok(()),
        }
    }

    fn autowiring(&self, site: &Site, error: AutowiringError) -> AutowireError {
        AutowireError::Autowiring {
            context: self
                .graph
                .context(site.provider)
                .argument(site.argument.clone()),
            error,
        }
    }

    fn ambiguous(
        &self,
        site: &Site,
        capability: CapabilityId,
        candidates: &[ProviderId],
    ) -> AutowireError {
        self.autowiring(
            site,
            AutowiringError::AmbiguousCandidates {
                capability: self.contracts.name(capability).to_owned(),
                candidates: candidates
                    .iter()
                    .map(|v| self.graph.definition(*v).id.clone())
                    .collect(),
            },
        )
    }

    fn unwrap_error(&self, site: &Site, signature: &Signature, error: UnwrapError) -> AutowireError {
        let signature = self.contracts.render(signature).to_string();
        let error = match error {
            UnwrapError::Unsupported(reason) => {
                DefinitionError::UnsupportedSignature { signature, reason }
            }
            UnwrapError::InvalidRest => DefinitionError::InvalidRestParameter { signature },
        };
        AutowireError::Definition {
            context: self
                .graph
                .context(site.provider)
                .argument(site.argument.clone()),
            error,
        }
    }

    fn cycle(&self, cycle: Vec<ProviderId>) -> AutowireError {
        AutowireError::CyclicDependency {
            graph: self.graph.name().to_owned(),
            chain: cycle
                .into_iter()
                .map(|v| self.graph.definition(v).id.clone())
                .collect(),
        }
    }

    fn mismatch(&self, expected: ProviderId, actual: Option<ProviderId>) -> AutowireError {
        InternalError::ChainMismatch {
            expected: self.graph.definition(expected).id.clone(),
            actual: actual.map(|v| self.graph.definition(v).id.clone()),
        }
        .into()
    }

    fn frame_mismatch(&self, actual: Option<ProviderId>) -> AutowireError {
        InternalError::ChainMismatch {
            expected: "end of frame".to_owned(),
            actual: actual.map(|v| self.graph.definition(v).id.clone()),
        }
        .into()
    }
}

/// Parameters of a hook or decorator after the instance it receives.
fn instance_params(params: &[Param]) -> &[Param] {
    params.get(1..).unwrap_or_default()
}

/// The method an auto-implemented provider synthesizes.
pub(crate) fn auto_method<'c>(
    contracts: &'c Contracts,
    definition: &ProviderDefinition,
) -> Option<&'c crate::Method> {
    contracts
        .get(definition.capability)
        .filter(|v| v.is_abstract())
        .and_then(|v| v.single_abstract_method())
}

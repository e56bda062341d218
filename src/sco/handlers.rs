//! Built-in handler bodies, one per operation kind
//!
//! Each handler validates its argument, then writes through the
//! transaction kind matching its target's category. Validation failures
//! are `InvalidValue`; store failures surface as `Other`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use super::operation::{
    HandlerContext, InvocationFailure, OperationArgument, OperationHandler, OperationKind,
};
use crate::mdib::{
    ContextAssociation, Descriptor, MetricValue, NodeType, State, StateCategory, TransactionKind,
};

/// Callback run by the activate handler with the request's arguments.
pub type ActivateCallback =
    Arc<dyn Fn(&HandlerContext<'_>, &[String]) -> Result<(), InvocationFailure> + Send + Sync>;

/// Wrap a closure as an activate callback.
pub fn activate_fn<F>(f: F) -> ActivateCallback
where
    F: Fn(&HandlerContext<'_>, &[String]) -> Result<(), InvocationFailure> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn proposed_states<'a>(ctx: &'a HandlerContext<'_>) -> Result<&'a [State], InvocationFailure> {
    match &ctx.request.argument {
        OperationArgument::States(states) if !states.is_empty() => Ok(states),
        other => Err(InvocationFailure::invalid_value(format!(
            "{:?} expects proposed states, got {:?}",
            ctx.operation.kind, other
        ))),
    }
}

fn target_node_type(ctx: &HandlerContext<'_>) -> Result<NodeType, InvocationFailure> {
    ctx.transactions
        .store()
        .by_handle(&ctx.operation.target_handle)
        .map(|e| e.node_type())
        .map_err(|_| {
            InvocationFailure::invalid_value(format!(
                "operation target '{}' does not exist",
                ctx.operation.target_handle
            ))
        })
}

/// Replace the bodies of existing states of one category.
fn apply_states(
    ctx: &HandlerContext<'_>,
    kind: TransactionKind,
    category: StateCategory,
) -> Result<(), InvocationFailure> {
    let proposed = proposed_states(ctx)?;
    ctx.transactions
        .transaction(kind, |tx| -> Result<(), InvocationFailure> {
            for state in proposed {
                if state.category() != category {
                    return Err(InvocationFailure::invalid_value(format!(
                        "proposed state '{}' is not a {} state",
                        state.key(),
                        category
                    )));
                }
                if tx.snapshot().state(state.key()).is_err() {
                    return Err(InvocationFailure::invalid_value(format!(
                        "proposed state '{}' does not exist",
                        state.key()
                    )));
                }
                tx.update_state(state.clone())?;
            }
            Ok(())
        })?;
    Ok(())
}

/// Writes a numeric value into the target numeric metric.
#[derive(Debug, Default)]
pub struct SetValueHandler;

impl OperationHandler for SetValueHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        let OperationArgument::Numeric(value) = ctx.request.argument else {
            return Err(InvocationFailure::invalid_value("set-value expects a numeric argument"));
        };
        if !value.is_finite() {
            return Err(InvocationFailure::invalid_value(format!("{value} is not a finite number")));
        }
        if target_node_type(ctx)? != NodeType::NumericMetric {
            return Err(InvocationFailure::invalid_value(format!(
                "'{}' is not a numeric metric",
                ctx.operation.target_handle
            )));
        }

        ctx.transactions
            .metric_state_transaction(|tx| -> Result<(), InvocationFailure> {
                let state = tx.state_mut(&ctx.operation.target_handle)?;
                if let Some(metric) = state.as_metric_mut() {
                    metric.value = Some(MetricValue::Numeric(value));
                    metric.determination_time = Some(Utc::now());
                }
                Ok(())
            })?;
        Ok(())
    }
}

/// Writes a string into the target string or enum-string metric.
#[derive(Debug, Default)]
pub struct SetStringHandler;

impl OperationHandler for SetStringHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        let OperationArgument::Text(text) = &ctx.request.argument else {
            return Err(InvocationFailure::invalid_value("set-string expects a text argument"));
        };
        if !matches!(
            target_node_type(ctx)?,
            NodeType::StringMetric | NodeType::EnumStringMetric
        ) {
            return Err(InvocationFailure::invalid_value(format!(
                "'{}' is not a string metric",
                ctx.operation.target_handle
            )));
        }

        ctx.transactions
            .metric_state_transaction(|tx| -> Result<(), InvocationFailure> {
                let state = tx.state_mut(&ctx.operation.target_handle)?;
                if let Some(metric) = state.as_metric_mut() {
                    metric.value = Some(MetricValue::Text(text.clone()));
                    metric.determination_time = Some(Utc::now());
                }
                Ok(())
            })?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SetMetricStateHandler;

impl OperationHandler for SetMetricStateHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        apply_states(ctx, TransactionKind::Metric, StateCategory::Metric)
    }
}

#[derive(Debug, Default)]
pub struct SetAlertStateHandler;

impl OperationHandler for SetAlertStateHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        apply_states(ctx, TransactionKind::Alert, StateCategory::Alert)
    }
}

#[derive(Debug, Default)]
pub struct SetComponentStateHandler;

impl OperationHandler for SetComponentStateHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        apply_states(ctx, TransactionKind::Component, StateCategory::Component)
    }
}

/// Creates and updates context states, keeping at most one associated
/// state per context descriptor.
///
/// A proposed state is new when it has no handle, when its handle equals
/// its descriptor handle, or when its handle is unknown. Associating a
/// state disassociates the previously associated states of the same
/// descriptor in the same transaction.
#[derive(Debug, Default)]
pub struct SetContextStateHandler;

impl SetContextStateHandler {
    fn validate(proposed: &[State]) -> Result<(), InvocationFailure> {
        let mut associated: HashMap<&str, usize> = HashMap::new();
        for state in proposed {
            let Some(context) = state.as_context() else {
                return Err(InvocationFailure::invalid_value(format!(
                    "proposed state '{}' is not a context state",
                    state.key()
                )));
            };
            if context.is_associated() {
                let count = associated.entry(&state.descriptor_handle).or_default();
                *count += 1;
                if *count > 1 {
                    return Err(InvocationFailure::invalid_value(format!(
                        "more than one associated state proposed for '{}'",
                        state.descriptor_handle
                    )));
                }
            }
        }
        Ok(())
    }
}

impl OperationHandler for SetContextStateHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        let proposed = proposed_states(ctx)?;
        Self::validate(proposed)?;

        ctx.transactions
            .context_state_transaction(|tx| -> Result<(), InvocationFailure> {
                let binding_version = tx.mdib_version() + 1;
                let now = Utc::now();

                for proposal in proposed {
                    let descriptor_handle = proposal.descriptor_handle.as_str();
                    match tx.snapshot().get(descriptor_handle) {
                        Some(entity) if entity.is_multi_state() => {}
                        _ => {
                            return Err(InvocationFailure::invalid_value(format!(
                                "'{}' is not a context descriptor",
                                descriptor_handle
                            )))
                        }
                    }

                    let explicit = proposal
                        .handle
                        .as_deref()
                        .filter(|h| *h != descriptor_handle);
                    let existing = explicit.filter(|h| tx.snapshot().is_known_handle(h));

                    let key = match existing {
                        Some(handle) => {
                            if tx.snapshot().context_owner(handle) != Some(descriptor_handle) {
                                return Err(InvocationFailure::invalid_value(format!(
                                    "context state '{}' does not belong to '{}'",
                                    handle, descriptor_handle
                                )));
                            }
                            tx.update_state(proposal.clone())?;
                            handle.to_string()
                        }
                        None => {
                            let state = tx.new_context_state(descriptor_handle, explicit)?;
                            state.body = proposal.body.clone();
                            state.key().to_string()
                        }
                    };

                    let association = proposal
                        .as_context()
                        .map(|c| c.association)
                        .unwrap_or(ContextAssociation::NotAssociated);

                    match association {
                        ContextAssociation::Associated => {
                            if let Some(context) = tx.state_mut(&key)?.as_context_mut() {
                                context.binding_mdib_version = Some(binding_version);
                                context.unbinding_mdib_version = None;
                                context.binding_start_time.get_or_insert(now);
                            }
                            let others: Vec<String> = tx
                                .context_states(descriptor_handle)?
                                .into_iter()
                                .filter(|s| s.key() != key)
                                .filter(|s| s.as_context().map_or(false, |c| c.is_associated()))
                                .map(|s| s.key().to_string())
                                .collect();
                            for other in others {
                                if let Some(context) = tx.state_mut(&other)?.as_context_mut() {
                                    context.association = ContextAssociation::Disassociated;
                                    context.unbinding_mdib_version = Some(binding_version);
                                    context.binding_end_time = Some(now);
                                }
                            }
                        }
                        ContextAssociation::Disassociated => {
                            if let Some(context) = tx.state_mut(&key)?.as_context_mut() {
                                context.unbinding_mdib_version.get_or_insert(binding_version);
                                context.binding_end_time.get_or_insert(now);
                            }
                        }
                        ContextAssociation::NotAssociated | ContextAssociation::PreAssociated => {}
                    }
                }
                Ok(())
            })?;
        Ok(())
    }
}

/// Runs a caller-supplied callback; succeeds without effect by default.
#[derive(Default)]
pub struct ActivateHandler {
    callback: Option<ActivateCallback>,
}

impl ActivateHandler {
    pub fn new(callback: ActivateCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }
}

impl fmt::Debug for ActivateHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivateHandler")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl OperationHandler for ActivateHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<(), InvocationFailure> {
        let arguments: &[String] = match &ctx.request.argument {
            OperationArgument::Arguments(args) => args,
            OperationArgument::None => &[],
            other => {
                return Err(InvocationFailure::invalid_value(format!(
                    "activate expects arguments, got {:?}",
                    other
                )))
            }
        };
        match &self.callback {
            Some(callback) => callback(ctx, arguments),
            None => Ok(()),
        }
    }
}

/// Chooses the handler body for an operation descriptor.
pub trait HandlerProvider: Send + Sync {
    /// `None` skips the operation.
    fn handler(
        &self,
        kind: OperationKind,
        descriptor: &Descriptor,
    ) -> Option<Arc<dyn OperationHandler>>;
}

/// Built-in handlers for every kind; activate runs the configured callback.
#[derive(Default)]
pub struct DefaultHandlers {
    activate: Option<ActivateCallback>,
}

impl DefaultHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activate(mut self, callback: ActivateCallback) -> Self {
        self.activate = Some(callback);
        self
    }
}

impl HandlerProvider for DefaultHandlers {
    fn handler(
        &self,
        kind: OperationKind,
        _descriptor: &Descriptor,
    ) -> Option<Arc<dyn OperationHandler>> {
        let handler: Arc<dyn OperationHandler> = match kind {
            OperationKind::SetValue => Arc::new(SetValueHandler),
            OperationKind::SetString => Arc::new(SetStringHandler),
            OperationKind::SetMetricState => Arc::new(SetMetricStateHandler),
            OperationKind::SetAlertState => Arc::new(SetAlertStateHandler),
            OperationKind::SetComponentState => Arc::new(SetComponentStateHandler),
            OperationKind::SetContextState => Arc::new(SetContextStateHandler),
            OperationKind::Activate => match &self.activate {
                Some(callback) => Arc::new(ActivateHandler::new(Arc::clone(callback))),
                None => Arc::new(ActivateHandler::default()),
            },
        };
        Some(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdib::{
        ComponentActivation, ContextState, MdibResult, TransactionManager,
    };
    use crate::sco::invocation::{InvocationError, TransactionId};
    use crate::sco::operation::{InvocationRequest, Operation};

    fn manager() -> TransactionManager {
        let tm = TransactionManager::with_sequence_id("urn:uuid:handlers");
        tm.descriptor_transaction(|tx| -> MdibResult<()> {
            tx.insert_new(NodeType::Mds, "mds", None)?;
            tx.insert_new(NodeType::Vmd, "vmd", Some("mds"))?;
            tx.insert_new(NodeType::Channel, "ch", Some("vmd"))?;
            tx.insert_new(NodeType::NumericMetric, "hr", Some("ch"))?;
            tx.insert_new(NodeType::StringMetric, "note", Some("ch"))?;
            tx.insert_new(NodeType::SystemContext, "sc", Some("mds"))?;
            tx.insert_new(NodeType::PatientContext, "pat", Some("sc"))?;
            Ok(())
        })
        .unwrap();
        tm
    }

    fn run(
        tm: &TransactionManager,
        handler: &dyn OperationHandler,
        kind: OperationKind,
        target: &str,
        argument: OperationArgument,
    ) -> Result<(), InvocationFailure> {
        let operation = Operation::new("op", target, kind, Arc::new(SetValueHandler));
        let request = InvocationRequest::new("op", argument);
        let ctx = HandlerContext {
            operation: &operation,
            request: &request,
            transactions: tm,
            transaction_id: TransactionId::new(1),
        };
        handler.handle(&ctx)
    }

    fn patient(handle: Option<&str>, association: ContextAssociation) -> State {
        let mut state = State::new(
            "pat",
            crate::mdib::StateBody::Context(ContextState {
                association,
                identification: vec!["MRN".into()],
                binding_mdib_version: None,
                unbinding_mdib_version: None,
                binding_start_time: None,
                binding_end_time: None,
            }),
        );
        state.handle = handle.map(str::to_string);
        state
    }

    #[test]
    fn test_set_value() {
        let tm = manager();
        run(&tm, &SetValueHandler, OperationKind::SetValue, "hr", OperationArgument::Numeric(60.0))
            .unwrap();
        let state = tm.store().state("hr").unwrap();
        assert_eq!(state.as_metric().unwrap().value, Some(MetricValue::Numeric(60.0)));
        assert_eq!(state.state_version, 1);
    }

    #[test]
    fn test_set_value_rejects_text() {
        let tm = manager();
        let err = run(
            &tm,
            &SetValueHandler,
            OperationKind::SetValue,
            "hr",
            OperationArgument::Text("x".into()),
        )
        .unwrap_err();
        assert_eq!(err.error, InvocationError::InvalidValue);
        assert_eq!(tm.store().mdib_version(), 1);
    }

    #[test]
    fn test_set_string_on_numeric_target_rejected() {
        let tm = manager();
        let err = run(
            &tm,
            &SetStringHandler,
            OperationKind::SetString,
            "hr",
            OperationArgument::Text("x".into()),
        )
        .unwrap_err();
        assert_eq!(err.error, InvocationError::InvalidValue);

        run(
            &tm,
            &SetStringHandler,
            OperationKind::SetString,
            "note",
            OperationArgument::Text("hello".into()),
        )
        .unwrap();
        assert_eq!(
            tm.store().state("note").unwrap().as_metric().unwrap().value,
            Some(MetricValue::Text("hello".into()))
        );
    }

    #[test]
    fn test_set_component_state() {
        let tm = manager();
        let mut proposed = tm.store().state("ch").unwrap();
        proposed.as_component_mut().unwrap().activation = ComponentActivation::StandBy;
        run(
            &tm,
            &SetComponentStateHandler,
            OperationKind::SetComponentState,
            "ch",
            OperationArgument::States(vec![proposed]),
        )
        .unwrap();
        assert_eq!(tm.store().state("ch").unwrap().state_version, 1);
    }

    #[test]
    fn test_apply_states_rejects_wrong_category() {
        let tm = manager();
        let proposed = tm.store().state("hr").unwrap();
        let err = run(
            &tm,
            &SetComponentStateHandler,
            OperationKind::SetComponentState,
            "ch",
            OperationArgument::States(vec![proposed]),
        )
        .unwrap_err();
        assert_eq!(err.error, InvocationError::InvalidValue);
    }

    #[test]
    fn test_two_associated_proposals_rejected() {
        let tm = manager();
        let err = run(
            &tm,
            &SetContextStateHandler,
            OperationKind::SetContextState,
            "pat",
            OperationArgument::States(vec![
                patient(None, ContextAssociation::Associated),
                patient(Some("pat"), ContextAssociation::Associated),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.error, InvocationError::InvalidValue);
        assert_eq!(tm.store().mdib_version(), 1);
    }

    #[test]
    fn test_associating_disassociates_previous() {
        let tm = manager();
        run(
            &tm,
            &SetContextStateHandler,
            OperationKind::SetContextState,
            "pat",
            OperationArgument::States(vec![patient(Some("p1"), ContextAssociation::Associated)]),
        )
        .unwrap();
        let p1 = tm.store().context_state("p1").unwrap();
        assert_eq!(p1.as_context().unwrap().binding_mdib_version, Some(2));

        run(
            &tm,
            &SetContextStateHandler,
            OperationKind::SetContextState,
            "pat",
            OperationArgument::States(vec![patient(Some("p2"), ContextAssociation::Associated)]),
        )
        .unwrap();

        let p1 = tm.store().context_state("p1").unwrap();
        let p2 = tm.store().context_state("p2").unwrap();
        assert_eq!(p1.as_context().unwrap().association, ContextAssociation::Disassociated);
        assert_eq!(p1.as_context().unwrap().unbinding_mdib_version, Some(3));
        assert_eq!(p1.state_version, 1);
        assert!(p2.as_context().unwrap().is_associated());
        assert_eq!(p2.state_version, 0);
    }

    #[test]
    fn test_proposal_with_descriptor_handle_creates_state() {
        let tm = manager();
        run(
            &tm,
            &SetContextStateHandler,
            OperationKind::SetContextState,
            "pat",
            OperationArgument::States(vec![patient(Some("pat"), ContextAssociation::PreAssociated)]),
        )
        .unwrap();
        let entity = tm.store().by_handle("pat").unwrap();
        assert_eq!(entity.states().len(), 1);
        assert_ne!(entity.states()[0].key(), "pat");
    }

    #[test]
    fn test_activate_callback_receives_arguments() {
        let tm = manager();
        let handler = ActivateHandler::new(activate_fn(|_, args| {
            if args == ["go"] {
                Ok(())
            } else {
                Err(InvocationFailure::other("unexpected arguments"))
            }
        }));
        run(
            &tm,
            &handler,
            OperationKind::Activate,
            "mds",
            OperationArgument::Arguments(vec!["go".into()]),
        )
        .unwrap();
        assert!(run(&tm, &handler, OperationKind::Activate, "mds", OperationArgument::None).is_err());
    }
}

//! Context Association Tests
//!
//! End-to-end tests through a provider:
//! - Set-context-state invocations create and associate context states
//! - At most one associated state per context descriptor
//! - Report stream ordering of invocation and episodic reports

use sdc_mdib::mdib::{
    ContextAssociation, ContextState, DefaultEntityFactory, Descriptor, Entity, EntityFactory,
    MdibResult, NodeType, State, StateBody,
};
use sdc_mdib::sco::{
    DefaultHandlers, InvocationError, InvocationRequest, InvocationState, OperationArgument,
};
use sdc_mdib::{Provider, ProviderConfig, Report};

fn provider() -> Provider {
    let config = ProviderConfig {
        sequence_id: Some("urn:uuid:context".into()),
        ..ProviderConfig::default()
    };
    let provider = Provider::new(config).unwrap();
    provider
        .transactions()
        .descriptor_transaction(|tx| -> MdibResult<()> {
            tx.insert_new(NodeType::Mds, "mds", None)?;
            tx.insert_new(NodeType::SystemContext, "sc", Some("mds"))?;
            tx.insert_new(NodeType::PatientContext, "pat", Some("sc"))
        })
        .unwrap();

    let controller = provider.add_controller("mds").unwrap();
    provider
        .transactions()
        .descriptor_transaction(|tx| -> MdibResult<()> {
            let descriptor =
                Descriptor::new(NodeType::SetContextStateOperation, "op.pat", Some("mds.sco"))
                    .with_operation_target("pat");
            let state = DefaultEntityFactory.state(&descriptor, None);
            tx.insert(Entity::single(descriptor, state))
        })
        .unwrap();
    assert_eq!(controller.register_from_store(&DefaultHandlers::new()).unwrap(), 1);
    provider
}

fn patient(handle: Option<&str>, association: ContextAssociation) -> State {
    let mut state = State::new(
        "pat",
        StateBody::Context(ContextState {
            association,
            identification: vec!["MRN-0042".into()],
            binding_mdib_version: None,
            unbinding_mdib_version: None,
            binding_start_time: None,
            binding_end_time: None,
        }),
    );
    state.handle = handle.map(str::to_string);
    state
}

fn set_patient(states: Vec<State>) -> InvocationRequest {
    InvocationRequest::new("op.pat", OperationArgument::States(states)).with_caller("test")
}

fn associated(provider: &Provider) -> Vec<String> {
    provider
        .store()
        .by_handle("pat")
        .unwrap()
        .states()
        .into_iter()
        .filter(|s| s.as_context().map_or(false, |c| c.is_associated()))
        .map(|s| s.key().to_string())
        .collect()
}

// =============================================================================
// Association Tests
// =============================================================================

/// Associating a new patient disassociates the previous one.
#[test]
fn test_reassociation_keeps_single_associated_state() {
    let p = provider();
    p.start().unwrap();
    p.invoke(set_patient(vec![patient(Some("p1"), ContextAssociation::Associated)]));
    p.invoke(set_patient(vec![patient(Some("p2"), ContextAssociation::Associated)]));
    p.stop().unwrap();

    assert_eq!(associated(&p), vec!["p2".to_string()]);
    let p1 = p.store().context_state("p1").unwrap();
    let context = p1.as_context().unwrap();
    assert_eq!(context.association, ContextAssociation::Disassociated);
    assert!(context.unbinding_mdib_version.is_some());
    assert!(context.binding_end_time.is_some());
}

/// Two associated proposals for one descriptor fail the invocation.
#[test]
fn test_double_association_fails() {
    let p = provider();
    let version = p.store().mdib_version();
    let mut rx = p.subscribe_reports();

    p.start().unwrap();
    let response = p.invoke(set_patient(vec![
        patient(Some("p1"), ContextAssociation::Associated),
        patient(Some("p2"), ContextAssociation::Associated),
    ]));
    assert!(response.is_accepted());
    p.stop().unwrap();

    assert_eq!(p.store().mdib_version(), version);
    assert!(associated(&p).is_empty());

    let mut last = None;
    while let Ok(report) = rx.try_recv() {
        last = Some(report);
    }
    match last {
        Some(Report::OperationInvoked { report }) => {
            assert_eq!(report.state, InvocationState::Failed);
            assert_eq!(report.error, Some(InvocationError::InvalidValue));
        }
        other => panic!("unexpected last report {other:?}"),
    }
}

// =============================================================================
// Report Stream Tests
// =============================================================================

/// The episodic context report lands between START and FINISHED.
#[test]
fn test_report_stream_order() {
    let p = provider();
    let mut rx = p.subscribe_reports();

    p.start().unwrap();
    let response = p.invoke(set_patient(vec![patient(None, ContextAssociation::Associated)]));
    p.stop().unwrap();

    let mut kinds = Vec::new();
    while let Ok(report) = rx.try_recv() {
        let kind = match &report {
            Report::OperationInvoked { report } => {
                assert_eq!(report.transaction_id, response.transaction_id.unwrap());
                report.state.as_str().to_string()
            }
            Report::EpisodicContext { states, .. } => {
                assert_eq!(states.len(), 1);
                "context".to_string()
            }
            other => panic!("unexpected report {other:?}"),
        };
        kinds.push(kind);
    }
    assert_eq!(kinds, vec!["WAIT", "START", "context", "FINISHED"]);
    assert_eq!(associated(&p).len(), 1);
}

//! FSM unit tests

use hangar::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use hangar::models::deployment::DeploymentStatus;

const IN_PROGRESS: [DeploymentStatus; 4] = [
    DeploymentStatus::Cloning,
    DeploymentStatus::UploadingSource,
    DeploymentStatus::Building,
    DeploymentStatus::UploadingDist,
];

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_success_flow_is_monotonic() {
    let mut fsm = DeploymentFsm::new();
    let mut previous = fsm.state();

    for event in [
        DeploymentEvent::Start,
        DeploymentEvent::Cloned,
        DeploymentEvent::SourceUploaded,
        DeploymentEvent::Built,
        DeploymentEvent::DistUploaded,
    ] {
        let next = fsm.process(event).unwrap();
        assert!(next > previous);
        previous = next;
    }

    assert_eq!(fsm.state(), DeploymentStatus::Deployed);
    assert!(fsm.is_terminal());
}

#[test]
fn test_fsm_every_stage_can_fail() {
    for stage in IN_PROGRESS {
        let mut fsm = DeploymentFsm::from_status(stage);
        fsm.process(DeploymentEvent::Fail("stage error".to_string()))
            .unwrap();
        assert_eq!(fsm.state(), DeploymentStatus::Failed);
        assert_eq!(fsm.error(), Some("stage error"));
    }
}

#[test]
fn test_fsm_pending_cannot_fail() {
    let mut fsm = DeploymentFsm::new();
    assert!(fsm.process(DeploymentEvent::Fail("x".to_string())).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
}

#[test]
fn test_fsm_restart_from_any_stage() {
    for stage in IN_PROGRESS {
        let mut fsm = DeploymentFsm::from_status(stage);
        fsm.process(DeploymentEvent::Start).unwrap();
        assert_eq!(fsm.state(), DeploymentStatus::Cloning);
    }
}

#[test]
fn test_fsm_terminal_states_reject_everything() {
    for terminal in [DeploymentStatus::Deployed, DeploymentStatus::Failed] {
        let mut fsm = DeploymentFsm::from_status(terminal);
        assert!(fsm.process(DeploymentEvent::Start).is_err());
        assert!(fsm.process(DeploymentEvent::Fail("x".to_string())).is_err());
        assert_eq!(fsm.state(), terminal);
    }
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot skip cloning
    let result = fsm.process(DeploymentEvent::Built);
    assert!(result.is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::shade::Action;

#[test]
fn codes_are_stable() {
    assert_eq!(Error::ShadeNotFound { shade_id: 9 }.code(), "SHADE_NOT_FOUND");
    assert_eq!(
        Error::SceneNotFound { scene: "dusk".into() }.code(),
        "SCENE_NOT_FOUND"
    );
    assert_eq!(
        Error::ActionNotConfigured { shade_id: 3, action: Action::Stop }.code(),
        "ACTION_NOT_CONFIGURED"
    );
    assert_eq!(Error::NoDevice.code(), "NO_DEVICE");
    assert_eq!(Error::LinkBusy.code(), "LINK_BUSY");
    assert_eq!(Error::LinkTimeout.code(), "LINK_TIMEOUT");
    assert_eq!(Error::Cancelled.code(), "CANCELLED");
}

#[test]
fn link_failures_are_classified_internal() {
    assert!(Error::NoDevice.is_link_failure());
    assert!(Error::LinkBusy.is_link_failure());
    assert!(Error::LinkWrite { reason: "io".into() }.is_link_failure());
    assert!(Error::LinkTimeout.is_link_failure());

    assert!(!Error::ShadeNotFound { shade_id: 1 }.is_link_failure());
    assert!(!Error::SceneInvalid { scene: "x".into(), reason: "y".into() }.is_link_failure());
    assert!(!Error::Cancelled.is_link_failure());
}

#[test]
fn display_names_the_subject() {
    let e = Error::ShadeNotFound { shade_id: 42 };
    assert_eq!(e.to_string(), "shade 42 not found");

    let e = Error::ActionNotConfigured { shade_id: 7, action: Action::Stop };
    assert_eq!(e.to_string(), "action 'stop' is not configured for shade 7");
}

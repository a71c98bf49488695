// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    acm        = { "ttyACM0", true },
    usb        = { "ttyUSB3", true },
    console    = { "ttyS0", false },
    video      = { "video0", false },
    plain_tty  = { "tty", false },
)]
fn candidate_names(name: &str, expected: bool) {
    assert_eq!(is_candidate_name(name), expected);
}

#[yare::parameterized(
    vendor_caps  = { "usb-Arduino_LLC_Arduino_Micro-if00", true },
    vendor_lower = { "usb-arduino_uno-if00", true },
    other_vendor = { "usb-FTDI_FT232R_USB_UART-if00", false },
)]
fn by_id_vendor_match(name: &str, expected: bool) {
    assert_eq!(is_vendor_match(name), expected);
}

#[yare::parameterized(
    shade_reply   = { "Shade Controller v2", true },
    tx_reply      = { "TX READY", true },
    ready_reply   = { "ready", true },
    vendor_reply  = { "ARDUINO MICRO", true },
    noise         = { "garbage 0x00", false },
    empty         = { "", false },
)]
fn controller_identification(line: &str, expected: bool) {
    assert_eq!(identifies_controller(line), expected);
}

#[test]
fn status_starts_unbound() {
    let link = SerialLink::new();
    let status = link.status();
    assert!(!status.connected);
    assert!(status.port.is_none());
    assert!(status.recent.is_empty());
}

#[test]
fn recent_ring_is_bounded_and_newest_first() {
    let link = SerialLink::new();
    for i in 0..15 {
        link.record_tx(&format!("TX:{i}"), true);
    }
    let status = link.status();
    assert_eq!(status.recent.len(), 10);
    assert_eq!(status.recent[0].line, "TX:14");
    assert_eq!(status.recent[9].line, "TX:5");
}

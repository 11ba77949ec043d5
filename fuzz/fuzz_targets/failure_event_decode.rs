#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_supervisor::{Alert, FailureEvent};

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = serde_json::from_slice::<FailureEvent>(data) {
        let expected = format!("exited with code {}", event.exit_code);
        let alert = Alert::from_failure_event(event);
        assert_eq!(alert.id, alert.service);
        assert_eq!(alert.description, expected);
        assert_eq!(alert.action, "Start");
    }
});

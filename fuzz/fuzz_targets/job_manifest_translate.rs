#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_jobs::{parse_job_manifest, translate, TranslationContext, RESERVED_ENV_NAMES};
use warden_service::{parse_unit_description, render_systemd_unit};

fuzz_target!(|data: &[u8]| {
    let Ok(manifest) = parse_job_manifest(data) else {
        return;
    };
    let context = TranslationContext::new("/var/vcap/sys/log/fuzz", "http://localhost:2825", "10.0.0.5");
    for process in &manifest.processes {
        let descriptor = translate(process, &context);
        assert!(descriptor.arguments.is_empty() || descriptor.start_arguments.is_empty());
        for reserved in RESERVED_ENV_NAMES {
            let count = descriptor.env.iter().filter(|entry| entry.name == reserved).count();
            assert_eq!(count, 1);
        }
        let unit = render_systemd_unit(&descriptor);
        assert_eq!(parse_unit_description(&unit), Some("warden"));
    }
});

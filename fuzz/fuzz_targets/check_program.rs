#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = stepcheck_prog::Program::from_json(s) {
            if let Ok(interp) = stepcheck_prog::ProgramInterpreter::new(program) {
                let interp = interp.with_op_budget(200);
                let config = stepcheck_mc::SearchConfig {
                    halt_on_first_error: false,
                    max_states: Some(1_000),
                    max_depth: Some(50),
                    max_time_secs: Some(2),
                    ..stepcheck_mc::SearchConfig::default()
                };
                let _ = stepcheck_mc::SearchDriver::new(interp, config).run();
            }
        }
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = stepcheck_prog::Program::from_json(s) {
            let _ = stepcheck_prog::ProgramInterpreter::new(program);
        }
    }
});

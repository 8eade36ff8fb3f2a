#![no_main]

use libfuzzer_sys::fuzz_target;

use lotus::parser;

fuzz_target!(|data: &[u8]| {
    // We don't care about the result - we're looking for panics/crashes
    if let Ok(module) = parser::parse(data) {
        // every decoded body must materialise
        for body in &module.code {
            let _ = module.pool.to_instructions(body.body);
        }
    }
});

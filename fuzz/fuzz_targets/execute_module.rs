#![no_main]

use libfuzzer_sys::fuzz_target;

use lotus::parser::{self, module::ExportIndex};
use lotus::runtime::{Builder, FuelMeter, VmConfig};

fuzz_target!(|data: &[u8]| {
    let module = match parser::parse(data) {
        Ok(m) => m,
        Err(_) => return, // Invalid module, nothing to execute
    };
    let exports: Vec<(String, u32)> = module
        .exports
        .iter()
        .filter_map(|e| match e.index {
            ExportIndex::Function(index) => Some((e.name.clone(), index)),
            _ => None,
        })
        .collect();

    // Small limits keep runaway programs cheap
    let config = VmConfig {
        max_stack_words: 4096,
        max_frames: 256,
        max_labels: 4096,
        max_memory_pages: 16,
        validate_function_type: true,
    };
    let mut instance = match Builder::new(module)
        .config(config)
        .hook(Box::new(FuelMeter::new(100_000)))
        .build()
    {
        Ok(instance) => instance,
        Err(_) => return, // Instantiation failed (e.g., missing imports)
    };

    for (name, index) in exports {
        // zero for every parameter
        let arity = instance.function_type(index).map_or(0, |t| t.parameters.len());
        let _ = instance.execute_export(&name, &vec![0; arity]);
    }
});

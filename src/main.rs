use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lotus::parser::{self, module::ExportIndex, Module};
use lotus::runtime::{Builder, FuelMeter, Value, VmConfig};

/// Bytes of each data segment shown by `inspect`
const DATA_PREVIEW: usize = 32;

#[derive(Parser)]
#[command(name = "lotus", about = "WebAssembly MVP interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Call an exported function and print its result.
    Run {
        /// Path to a .wasm file.
        file: PathBuf,
        /// Name of the exported function.
        export: String,
        /// Arguments, parsed according to the function's parameter types.
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
        /// JSON file with interpreter limits.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many instructions.
        #[arg(long)]
        fuel: Option<u64>,
    },
    /// Print the section summary and disassemble every function body.
    Inspect {
        /// Path to a .wasm file.
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            file,
            export,
            args,
            config,
            fuel,
        } => run(&file, &export, &args, config.as_deref(), fuel),
        Command::Inspect { file } => inspect(&file),
    }
}

fn load(path: &Path) -> anyhow::Result<Module> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let module = parser::parse(&bytes).with_context(|| format!("decoding {}", path.display()))?;
    Ok(module)
}

fn run(path: &Path, export: &str, args: &[String], config: Option<&Path>, fuel: Option<u64>) -> anyhow::Result<()> {
    let module = load(path)?;
    let config = match config {
        Some(config_path) => {
            let json = std::fs::read_to_string(config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            VmConfig::from_json(&json).with_context(|| format!("parsing {}", config_path.display()))?
        }
        None => VmConfig::default(),
    };

    let mut builder = Builder::new(module).config(config);
    if let Some(fuel) = fuel {
        builder = builder.hook(Box::new(FuelMeter::new(fuel)));
    }
    let mut instance = builder.build()?;

    let index = match instance.module().export(export).map(|e| e.index) {
        Some(ExportIndex::Function(index)) => index,
        _ => bail!("no exported function named {:?}", export),
    };
    let params = instance
        .function_type(index)
        .map(|t| t.parameters.clone())
        .unwrap_or_default();
    if params.len() != args.len() {
        bail!("{} expects {} arguments, got {}", export, params.len(), args.len());
    }
    let values = params
        .iter()
        .zip(args)
        .map(|(value_type, text)| Value::parse(*value_type, text))
        .collect::<Result<Vec<_>, _>>()?;

    for result in instance.invoke(export, &values)? {
        println!("{}", result);
    }
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let module = load(path)?;
    print!("{}", module);

    let imported = module.imported_function_count();
    for (i, body) in module.code.iter().enumerate() {
        let index = (imported + i) as u32;
        let signature = module
            .function_type(index)
            .map_or_else(|| "?".to_string(), ToString::to_string);
        match module.get_function_name(index) {
            Some(name) => println!("\nfunc[{}] \"{}\" {}", index, name, signature),
            None => println!("\nfunc[{}] {}", index, signature),
        }
        for instruction in module.pool.to_instructions(body.body)? {
            print!("{}", instruction);
        }
    }
    for (i, data) in module.data.iter().enumerate() {
        let shown = &data.init[..data.init.len().min(DATA_PREVIEW)];
        let more = if data.init.len() > DATA_PREVIEW { "..." } else { "" };
        println!("\ndata[{}] {}{}", i, hex::encode(shown), more);
    }
    Ok(())
}

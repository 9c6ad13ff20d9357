//! Dump register definition tracking for machine function fixtures.
//!
//! Parses a fixture file, creates a tracker per function, prints the seeded
//! definition table and answers `REG@BLOCK` queries against the untranslated
//! function, showing the merges and deferred stores each query produces.

use bumpalo::Bump;
use clap::Parser;
use mcraise::core::{MachineAdaptor, RaiseSession};
use mcraise::mir::{MachineFunction, MirAdaptor};
use mcraise::x64::{parse_register, EflagBit};
use mcraise::{DefState, ValueTracker};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "trace_defs", about = "Trace register definitions in machine function fixtures")]
struct Args {
    /// Fixture file to load
    input: PathBuf,

    /// Only trace the named function
    #[arg(long)]
    func: Option<String>,

    /// Resolve a register or flag at a block, e.g. `rax@join` or `zf@exit`
    #[arg(long = "resolve", value_name = "REG@BLOCK")]
    resolve: Vec<String>,

    /// Require a definition along every predecessor path
    #[arg(long)]
    all_preds: bool,

    /// Print the decoded instructions of each block
    #[arg(long)]
    disasm: bool,

    /// Print session statistics at the end
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let text = match std::fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", args.input.display());
            return ExitCode::FAILURE;
        }
    };
    let funcs = match MachineFunction::parse(&text) {
        Ok(funcs) => funcs,
        Err(e) => {
            eprintln!("error: {}: {e}", args.input.display());
            return ExitCode::FAILURE;
        }
    };

    let arena = Bump::new();
    let session = RaiseSession::new(&arena);
    let mut failed = false;

    for machine in &funcs {
        if args.func.as_deref().is_some_and(|name| name != machine.name) {
            continue;
        }
        if let Err(e) = trace_function(&session, machine, &args) {
            eprintln!("error: {}: {e}", machine.name);
            failed = true;
        }
    }

    if args.stats {
        print!("{}", session.stats());
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn trace_function(
    session: &RaiseSession<'_>,
    machine: &MachineFunction,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let adaptor = MirAdaptor::new(machine);
    let mut func = machine.raised_function();
    let mut tracker = ValueTracker::new(session, &adaptor, &func)?;

    println!("function {}:", machine.name);
    if args.disasm {
        for block in adaptor.blocks() {
            println!("  {}:", adaptor.block_name(block));
            for inst in adaptor.block_insts(block) {
                println!(
                    "    {:<28} ; {}",
                    adaptor.instruction(inst).to_string(),
                    adaptor.inst_family(inst)
                );
            }
        }
    }

    println!("  definitions:");
    for (key, def) in tracker.definitions() {
        let state = match def.state {
            DefState::Value(v) => func.value_ref(v),
            DefState::Pending => "pending".to_string(),
            DefState::Unset => "unset".to_string(),
        };
        println!(
            "    {:<6} {:<12} i{:<3} {}",
            key.to_string(),
            adaptor.block_name(def.block),
            def.width,
            state
        );
    }

    for query in &args.resolve {
        let (name, block_name) = query
            .split_once('@')
            .ok_or_else(|| format!("malformed query '{query}', expected REG@BLOCK"))?;
        let block = adaptor
            .block_by_name(block_name)
            .ok_or_else(|| format!("unknown block '{block_name}'"))?;

        let value = if let Some(flag) = EflagBit::from_name(name) {
            tracker.read_flag(&mut func, flag, block)?
        } else {
            let reg = parse_register(name).ok_or_else(|| format!("unknown register '{name}'"))?;
            tracker.resolve(&mut func, reg, block, args.all_preds, true)?
        };
        match value {
            Some(v) => println!("  {query} = {}", func.value_ref(v)),
            None => println!("  {query} has no reaching definition"),
        }
    }

    for merge in tracker.merges() {
        println!(
            "  merge of {} at {} through {}",
            merge.key,
            adaptor.block_name(merge.block),
            func.slot(merge.slot).name
        );
    }
    for store in tracker.deferred() {
        println!(
            "  deferred store of {} from {} into {}",
            store.key,
            adaptor.block_name(store.block),
            func.slot(store.slot).name
        );
    }
    if !tracker.merges().is_empty() {
        print!("{func}");
    }
    Ok(())
}

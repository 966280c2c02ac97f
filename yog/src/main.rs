use std::process;
use std::rc::Rc;

use clap::{Parser as ClapParser, Subcommand};

use yog::format::format_hex;
use yog::numeric::{Number, number_of};
use yog::objects::Table;
use yog::primitives::parsing::parse_number;
use yog::strategy::ValueKeys;
use yog::{ErrorKind, ForeachAction, HeapSettings, Termination, Unwind, VM, Value, table};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Allocations between two collections
    #[arg(long, default_value_t = HeapSettings::default().gc_threshold)]
    gc_threshold: usize,

    /// Collect before every allocation
    #[arg(long, help = "Run a collection before every allocation")]
    stress_gc: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate `<lhs> <op> <rhs>` with the numeric tower
    Arith {
        #[arg(allow_hyphen_values = true)]
        lhs: String,
        op: String,
        #[arg(allow_hyphen_values = true)]
        rhs: String,
        /// Print integer results in hexadecimal
        #[arg(long)]
        hex: bool,
    },
    /// Fill a generic-keyed table and report its shape
    Table {
        count: usize,
        /// Log the bins and chains at debug level
        #[arg(long)]
        dump: bool,
    },
}

fn arith(vm: &mut VM, lhs: &str, op: &str, rhs: &str, hex: bool) -> Result<Value, Unwind> {
    vm.with_handles(|vm, hs| -> Result<Value, Unwind> {
        let lhs = parse_number(vm, lhs)?;
        hs.pin(vm, lhs);
        let rhs = parse_number(vm, rhs)?;
        hs.pin(vm, rhs);
        let result = vm.call_method(lhs, op, &[rhs])?;
        hs.pin(vm, result);
        let text = if hex {
            match number_of(vm, result) {
                Some(Number::Fixed(n)) => format_hex(&n.into()),
                Some(Number::Big(n)) => format_hex(&n),
                _ => {
                    let message = format!("cannot render '{}' as hex", vm.type_name(result));
                    return Err(vm.raise_error(ErrorKind::TypeError, &message));
                }
            }
        } else {
            vm.to_display(result)?
        };
        Ok(vm.new_string(&text))
    })
}

fn fill_table(vm: &mut VM, count: usize, dump: bool) -> Result<Value, Unwind> {
    let dict = table::create(vm, Rc::new(ValueKeys));
    vm.set_global("table", dict)?;
    for i in 0..count {
        let key = Value::from_i64(i as i64);
        let value = vm.new_string(&format!("value-{i}"));
        table::insert(vm, dict, key, value)?;
    }
    let mut visited = 0usize;
    table::foreach(vm, dict, |_, _, _| {
        visited += 1;
        Ok(ForeachAction::Continue)
    })?;
    if dump {
        table::dump(vm, dict)?;
    }
    let bins = vm.heap.body::<Table>(dict)?.bins_len();
    let summary = format!(
        "{} entries ({visited} visited) in {bins} bins, {} collections",
        table::size(vm, dict)?,
        vm.heap.stats().collections
    );
    Ok(vm.new_string(&summary))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let settings = HeapSettings {
        gc_threshold: cli.gc_threshold,
        stress: cli.stress_gc,
        ..HeapSettings::default()
    };
    if let Err(err) = settings.validate() {
        eprintln!("invalid heap settings: {err}");
        process::exit(2);
    }
    let mut vm = VM::new(settings);

    let termination = match &cli.command {
        Command::Arith { lhs, op, rhs, hex } => {
            vm.execute("<arith>", |vm| arith(vm, lhs, op, rhs, *hex))
        }
        Command::Table { count, dump } => vm.execute("<table>", |vm| fill_table(vm, *count, *dump)),
    };

    match &termination {
        Termination::Completed(value) => match vm.str_of(*value) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{value:?}"),
        },
        Termination::Unhandled {
            class_name,
            message,
            ..
        } => eprintln!("{class_name}: {message}"),
        Termination::Aborted(violation) => eprintln!("internal error: {violation}"),
    }
    process::exit(termination.exit_code());
}

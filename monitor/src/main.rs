//! A thin illustrative monitor front-end over `machina-core`: parses a
//! handful of `clap` subcommands into the option bags / path strings the
//! core's `device_add` / `device_del` / `device_show` / `info` commands
//! expect, drives one in-process `Machine`, and prints the result as JSON.
//!
//! Not a full monitor protocol implementation — no readline loop, no QMP,
//! one command per process invocation.

mod devices;

use clap::{Parser, Subcommand};
use machina_core::factory::{AddOutcome, HelpInfo, OptionBag};
use machina_core::{device_add, device_del, device_show, info, Machine, QdevError};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "monitor", about = "Illustrative device-composition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// device_add DRIVER [KEY=VALUE...]
    DeviceAdd {
        driver: String,
        #[arg(value_name = "KEY=VALUE")]
        props: Vec<String>,
    },
    /// device_del ID
    DeviceDel { id: String },
    /// device_show PATH
    DeviceShow {
        path: String,
        #[arg(long)]
        full: bool,
    },
    /// info tree | info device-list
    Info {
        #[command(subcommand)]
        which: InfoCommand,
    },
}

#[derive(Subcommand)]
enum InfoCommand {
    Tree,
    DeviceList,
}

fn main() {
    env_logger::init();
    devices::register();
    let cli = Cli::parse();
    let machine = Machine::new();

    let output = match cli.command {
        Command::DeviceAdd { driver, props } => run_device_add(&machine, driver, props),
        Command::DeviceDel { id } => run_device_del(&machine, &id),
        Command::DeviceShow { path, full } => run_device_show(&machine, &path, full),
        Command::Info { which } => match which {
            InfoCommand::Tree => {
                println!("{}", info::tree(&machine));
                return;
            }
            InfoCommand::DeviceList => {
                println!("{}", info::device_list());
                return;
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&output).expect("JSON envelope always serializes"));
    if output.get("error").is_some() {
        std::process::exit(-1);
    }
}

fn parse_bag(driver: String, props: Vec<String>) -> OptionBag {
    let mut bag = OptionBag::new();
    bag.insert("driver".to_string(), driver);
    for prop in props {
        match prop.split_once('=') {
            Some((key, value)) => {
                bag.insert(key.to_string(), value.to_string());
            }
            None => {
                // Bare `?` (property help) or a malformed `key` with no `=`.
                bag.insert(prop, String::new());
            }
        }
    }
    bag
}

fn run_device_add(machine: &Machine, driver: String, props: Vec<String>) -> Value {
    let bag = parse_bag(driver, props);
    match device_add(machine, bag) {
        Ok(AddOutcome::Created(device)) => {
            log::info!("device-add created '{}'", device.kind.name);
            json!({ "return": { "device": device.kind.name, "id": device.id() } })
        }
        Ok(AddOutcome::Help(HelpInfo::Kinds(kinds))) => {
            let names: Vec<&str> = kinds.iter().map(|k| k.name).collect();
            json!({ "return": { "kinds": names } })
        }
        Ok(AddOutcome::Help(HelpInfo::Properties { kind, properties })) => {
            json!({ "return": { "driver": kind.name, "properties": properties } })
        }
        Err(err) => error_envelope(&err),
    }
}

fn run_device_del(machine: &Machine, id: &str) -> Value {
    match device_del(machine, id) {
        Ok(()) => json!({ "return": {} }),
        Err(err) => error_envelope(&err),
    }
}

fn run_device_show(machine: &Machine, path: &str, full: bool) -> Value {
    match device_show(machine, path, full) {
        Ok(show) => json!({
            "device": show.device,
            "id": show.id,
            "version": show.version,
            "fields": show.fields,
        }),
        Err(err) => error_envelope(&err),
    }
}

fn error_envelope(err: &QdevError) -> Value {
    log::warn!("command failed: {err}");
    json!({ "error": { "desc": err.to_string() } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bag_splits_key_value_pairs_and_keeps_bare_tokens() {
        let bag = parse_bag("blinker".to_string(), vec!["rate=500".to_string(), "?".to_string()]);
        assert_eq!(bag.get("driver").map(String::as_str), Some("blinker"));
        assert_eq!(bag.get("rate").map(String::as_str), Some("500"));
        assert_eq!(bag.get("?").map(String::as_str), Some(""));
    }

    #[test]
    fn device_add_then_show_round_trips_through_the_toy_blinker() {
        devices::register();
        let machine = Machine::new();
        let added = run_device_add(&machine, "blinker".to_string(), vec!["rate=250".to_string(), "id=led0".to_string()]);
        assert!(added.get("return").is_some(), "unexpected envelope: {added}");

        let shown = run_device_show(&machine, "led0", false);
        assert_eq!(shown["device"], "blinker.0");
        assert_eq!(shown["id"], "led0");
    }

    #[test]
    fn device_add_with_unknown_driver_returns_an_error_envelope() {
        let machine = Machine::new();
        let result = run_device_add(&machine, "no-such-driver".to_string(), vec![]);
        assert!(result.get("error").is_some(), "unexpected envelope: {result}");
    }

    #[test]
    fn device_del_of_a_missing_id_returns_an_error_envelope() {
        let machine = Machine::new();
        let result = run_device_del(&machine, "nope");
        assert!(result.get("error").is_some(), "unexpected envelope: {result}");
    }

    #[test]
    fn toy_bridge_hosts_a_child_after_board_setup_opens_its_bus() {
        use machina_core::registry::find_device_kind;

        devices::register();
        let machine = Machine::new();
        let bridge = run_device_add(&machine, "toy-bridge".to_string(), vec!["id=bridge0".to_string()]);
        assert!(bridge.get("return").is_some(), "unexpected envelope: {bridge}");

        let bridge_device = machina_core::path::resolve_device(&machine.root(), "bridge0").unwrap();
        let child_bus_kind = find_device_kind(None, "toy-child").unwrap().bus_kind;
        let child_bus_kind = machina_core::registry::find_bus_kind(child_bus_kind).unwrap();
        machine.create_bus(child_bus_kind, Some(&bridge_device), None, true);

        let mut child_bag = OptionBag::new();
        child_bag.insert("driver".to_string(), "toy-child".to_string());
        child_bag.insert("id".to_string(), "child0".to_string());
        device_add(&machine, child_bag).unwrap();

        assert!(machina_core::path::find_by_id(&machine.root(), "child0").is_some());
    }
}

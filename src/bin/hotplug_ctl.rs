use std::path::PathBuf;
use std::process;

use hotplug_governor::config::DEFAULT_CONTROL_DIR;
use hotplug_governor::control::{
    LOAD_THRESHOLD_FILE, SUSPEND_FREQUENCY_FILE, read_snapshot, write_value,
};

fn print_usage() {
    println!("hotplug_ctl - read or change the tunables of a running hotplug governor");
    println!();
    println!("Usage:");
    println!("  hotplug_ctl [--dir <path>] get");
    println!("  hotplug_ctl [--dir <path>] set <key> <value>");
    println!();
    println!("Keys:");
    println!("  load-threshold      load (percent at max frequency) that counts as busy");
    println!("  suspend-frequency   cpu0 max frequency in kHz while the display is off");
    println!();
    println!("Options:");
    println!("  --dir <path>        control directory (default: {DEFAULT_CONTROL_DIR})");
    println!("  --help              show this help");
    println!();
    println!("Example: sudo hotplug_ctl set suspend-frequency 702000");
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!();
    print_usage();
    process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut dir = PathBuf::from(DEFAULT_CONTROL_DIR);
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--dir" => {
                let Some(path) = args.get(i + 1) else {
                    fail("--dir requires an argument");
                };
                dir = PathBuf::from(path);
                i += 1;
            }
            other => rest.push(other),
        }
        i += 1;
    }

    match rest.as_slice() {
        ["get"] => {
            let snapshot = read_snapshot(&dir)?
                .ok_or("control files hold invalid values, is the governor running?")?;
            print!("{}", toml::to_string(&snapshot)?);
        }
        ["set", key, value] => {
            let file = match *key {
                "load-threshold" => LOAD_THRESHOLD_FILE,
                "suspend-frequency" => SUSPEND_FREQUENCY_FILE,
                other => fail(&format!("unknown key {other}")),
            };
            let value: u32 = value
                .parse()
                .unwrap_or_else(|_| fail("value must be an unsigned 32-bit integer"));
            write_value(&dir, file, value)?;
            println!("{key} = {value}");
        }
        [] => fail("missing command"),
        _ => fail("unknown command"),
    }

    Ok(())
}

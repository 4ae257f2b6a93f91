use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use clap_num::maybe_hex;

use ath3k::{NusbDevice, Personality, Registry, config::EndpointCheck, usb::Direction};
use error::CliError;
use firmware::FirmwareImage;
use list::*;
use load::*;

mod error;
mod list;
mod load;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// personality table (TOML) to use instead of the built-in one
    #[clap(long, global = true)]
    personalities: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct DeviceFilter {
    /// vendor ID (ex: "0cf3")
    #[clap(short, long, value_parser=hex_u16)]
    vendor: Option<u16>,
    /// product ID (ex: "3000")
    #[clap(short, long, value_parser=hex_u16)]
    product: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// list controllers waiting for firmware
    List {
        #[command(flatten)]
        filter: DeviceFilter,
    },
    /// load firmware onto a controller
    Load {
        /// firmware image (ex: ath3k-1.fw)
        file: Option<PathBuf>,
        #[command(flatten)]
        filter: DeviceFilter,
        /// bulk pipe index (ex: 2)
        #[clap(long, value_parser=maybe_hex::<u8>)]
        pipe: Option<u8>,
        /// endpoint that must be present (ex: "2:out")
        #[clap(long = "check-endpoint", value_parser=parse_endpoint_check)]
        check_endpoints: Vec<EndpointCheck>,
        /// control request attempts (1-5)
        #[clap(short, long)]
        retries: Option<u8>,
        /// send the actual length of the last block
        #[clap(long)]
        exact_length: bool,
        /// hold the controller without loading firmware
        #[clap(long)]
        mask: bool,
    },
    /// show the personality table
    Personalities,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::List {
            filter: DeviceFilter::default(),
        }
    }
}

fn hex_u16(s: &str) -> Result<u16, String> {
    <u16>::from_str_radix(s, 16).map_err(|e| format!("{e}"))
}

fn parse_endpoint_check(s: &str) -> Result<EndpointCheck, String> {
    let (number, direction) = s
        .split_once(':')
        .ok_or_else(|| format!("expected NUMBER:DIRECTION, got \"{s}\""))?;
    let number = maybe_hex::<u8>(number)?;
    let direction = match direction.to_ascii_lowercase().as_str() {
        "out" => Direction::Out,
        "in" => Direction::In,
        other => return Err(format!("invalid direction \"{other}\"")),
    };
    Ok(EndpointCheck { number, direction })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::init();

    let registry = match &cli.personalities {
        Some(path) => Registry::load(path),
        None => Registry::builtin(),
    };
    let registry = match registry {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = match cli.command.unwrap_or_default() {
        Commands::List { filter } => {
            list_devices(&registry, filter.vendor, filter.product)
        }
        Commands::Load {
            file,
            filter,
            pipe,
            check_endpoints,
            retries,
            exact_length,
            mask,
        } => {
            let overrides = Overrides {
                pipe_index: pipe,
                check_endpoints,
                attempts: retries,
                exact_length,
                mask,
            };
            load_cmd(&registry, file.as_ref(), &filter, &overrides)
        }
        Commands::Personalities => {
            print_personalities(&registry);
            Ok(())
        }
    } {
        eprintln!("Error: {err}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn get_device(
    registry: &Registry,
    filter: &DeviceFilter,
) -> Result<(NusbDevice, Personality), CliError> {
    let mut devices = matching_devices(registry, filter.vendor, filter.product)?;
    if devices.is_empty() {
        return Err(CliError::NoDevice);
    }
    if devices.len() > 1 {
        return Err(CliError::ManyDevices);
    }

    let device = devices.remove(0);
    let (vid, pid) = (device.vendor_id(), device.product_id());
    let personality = registry
        .lookup(vid, pid)
        .cloned()
        .ok_or(CliError::NoPersonality(vid, pid))?;
    Ok((device, personality))
}

fn firmware_image(file: Option<&PathBuf>) -> Result<FirmwareImage, CliError> {
    match file {
        Some(path) => Ok(FirmwareImage::load(path)?),
        #[cfg(feature = "embedded")]
        None => Ok(FirmwareImage::embedded()?),
        #[cfg(not(feature = "embedded"))]
        None => Err(CliError::NoFirmware),
    }
}

fn load_cmd(
    registry: &Registry,
    file: Option<&PathBuf>,
    filter: &DeviceFilter,
    overrides: &Overrides,
) -> Result<(), CliError> {
    let firmware = firmware_image(file)?;
    let (device, personality) = get_device(registry, filter)?;
    load_firmware(device, &personality, &firmware, overrides)
}

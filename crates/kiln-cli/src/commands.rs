//! Subcommand execution.

use crate::{Command, VolumeCommand};
use anyhow::{Context, Result};
use kiln_core::platform::fs;
use kiln_core::transport::Connector;
use kiln_core::{Client, Descriptor};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Run one subcommand and print its result to `out`.
pub fn run<C: Connector, W: Write>(
    client: &mut Client<C>,
    command: &Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::List => {
            for name in client.list()? {
                writeln!(out, "{}", name)?;
            }
        }
        Command::Create { name } => client.create(name)?,
        Command::Destroy { name } => client.destroy(name)?,
        Command::Start { name } => client.start(name)?,
        Command::Stop { name } => client.stop(name)?,
        Command::Kill { name, signal } => client.kill(name, *signal)?,
        Command::Pause { name } => client.pause(name)?,
        Command::Resume { name } => client.resume(name)?,
        Command::Get { names, variables } => {
            for (name, values) in client.get(names, variables)? {
                writeln!(out, "{}", name)?;
                for (variable, value) in values {
                    match (&value.value, value.is_ok()) {
                        (Some(v), true) => writeln!(out, "  {} = {}", variable, v)?,
                        _ => writeln!(out, "  {}: {}: {}", variable, value.error, value.message)?,
                    }
                }
            }
        }
        Command::GetProperty { name, property } => {
            writeln!(out, "{}", client.get_property(name, property)?)?
        }
        Command::SetProperty {
            name,
            property,
            value,
        } => client.set_property(name, property, value)?,
        Command::GetData { name, data } => writeln!(out, "{}", client.get_data(name, data)?)?,
        Command::Properties => print_descriptors(out, &client.property_list()?)?,
        Command::Data => print_descriptors(out, &client.data_list()?)?,
        Command::Wait { names } => writeln!(out, "{}", client.wait(names)?)?,
        Command::Version => {
            let version = client.version()?;
            writeln!(out, "{} {}", version.tag, version.revision)?
        }
        Command::Volume(volume) => run_volume(client, volume, out)?,
        Command::Raw { message } => writeln!(out, "{}", client.raw(message)?)?,
    }
    Ok(())
}

fn run_volume<C: Connector, W: Write>(
    client: &mut Client<C>,
    command: &VolumeCommand,
    out: &mut W,
) -> Result<()> {
    match command {
        VolumeCommand::Create {
            path,
            source,
            quota,
            flags,
            prepare,
        } => {
            if *prepare {
                prepare_dir(Path::new(path))?;
            }
            client.create_volume(path, source, quota, flags)?;
        }
        VolumeCommand::Destroy { path } => client.destroy_volume(path)?,
        VolumeCommand::List => {
            for volume in client.list_volumes()? {
                writeln!(
                    out,
                    "{}\tsource={}\tquota={}\tflags={}\tused={}\tavailable={}",
                    volume.path,
                    volume.source,
                    volume.quota,
                    volume.flags,
                    volume.used,
                    volume.available
                )?;
            }
        }
    }
    Ok(())
}

/// Make sure `path` is a directory, creating it if missing.
fn prepare_dir(path: &Path) -> Result<()> {
    if fs::dir_exists(path)? {
        return Ok(());
    }
    fs::create_dir(path, 0o755)
        .with_context(|| format!("failed to prepare volume directory {}", path.display()))?;
    info!("Prepared volume directory {}", path.display());
    Ok(())
}

fn print_descriptors<W: Write>(out: &mut W, list: &[Descriptor]) -> Result<()> {
    let width = list.iter().map(|d| d.name.len()).max().unwrap_or(0);
    for d in list {
        writeln!(out, "{:<width$}  {}", d.name, d.description, width = width)?;
    }
    Ok(())
}

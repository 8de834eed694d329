//! Line-oriented bridge console.
//!
//! ```text
//! add <parent> <device_type> [address]
//! remove <endpoint|address>
//! list
//! support
//! reset
//! help
//! quit
//! ```
//!
//! Numbers are decimal or `0x` hex. A device type may also be given by its
//! registry name (`on_off_light`). Every command answers with one
//! `OK: ...` or `ERROR(<status>): ...` line, optionally followed by detail
//! lines.

use crate::bridge::address::{PhysicalAddress, parse_number};
use crate::bridge::manager::BridgeManager;
use crate::bridge::registry::DeviceTypeRegistry;
use crate::error::{BridgeError, Result, StatusCode};
use crate::matter::endpoint::EndpointId;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const PROMPT: &str = "bridge> ";

const HELP: &str = "\
  add <parent> <device_type> [address]  bridge a device (address defaults to the next free virt:N)
  remove <endpoint|address>             remove a bridged device
  list                                  list bridged devices
  support                               list supported device types
  reset                                 remove all devices and wipe persisted state
  help                                  show this help
  quit                                  leave the console";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTarget {
    Endpoint(EndpointId),
    Address(PhysicalAddress),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        parent: EndpointId,
        device_type_id: u32,
        address: Option<PhysicalAddress>,
    },
    Remove(RemoveTarget),
    List,
    Support,
    Reset,
    Help,
    Quit,
}

/// Result of one console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: StatusCode,
    pub text: String,
}

impl CommandOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            text: format!("OK: {}", text.into()),
        }
    }

    pub fn error(err: &BridgeError) -> Self {
        let status = err.status();
        Self {
            status,
            text: format!("ERROR({}): {}", status, err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }
}

impl From<Result<String>> for CommandOutput {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(text) => Self::ok(text),
            Err(e) => Self::error(&e),
        }
    }
}

fn usage(text: &str) -> BridgeError {
    BridgeError::InvalidArgument(format!("usage: {}", text))
}

fn parse_arg<T: TryFrom<u64>>(arg: &str, what: &str) -> Result<T> {
    parse_number(arg).ok_or_else(|| BridgeError::InvalidArgument(format!("invalid {} '{}'", what, arg)))
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse_command(line: &str, registry: &DeviceTypeRegistry) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("add", [parent, device_type, rest @ ..]) if rest.len() <= 1 => {
            let parent = parse_arg(parent, "parent endpoint")?;
            let device_type_id = match parse_number(device_type) {
                Some(id) => id,
                None => registry
                    .entries()
                    .find(|e| e.name.eq_ignore_ascii_case(device_type))
                    .map(|e| e.id)
                    .ok_or_else(|| {
                        BridgeError::InvalidArgument(format!("unknown device type '{}'", device_type))
                    })?,
            };
            let address: Option<PhysicalAddress> = rest.first().map(|a| a.parse()).transpose()?;
            Command::Add {
                parent,
                device_type_id,
                address,
            }
        }
        ("add", _) => return Err(usage("add <parent> <device_type> [address]")),
        ("remove", [target]) => match parse_number(target) {
            Some(id) => Command::Remove(RemoveTarget::Endpoint(id)),
            None => Command::Remove(RemoveTarget::Address(target.parse()?)),
        },
        ("remove", _) => return Err(usage("remove <endpoint|address>")),
        ("list", []) => Command::List,
        ("support", []) => Command::Support,
        ("reset", []) => Command::Reset,
        ("help", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        ("list" | "support" | "reset" | "quit" | "exit", _) => {
            return Err(usage(verb));
        }
        _ => {
            return Err(BridgeError::InvalidArgument(format!(
                "unknown command '{}', try 'help'",
                verb
            )));
        }
    };
    Ok(Some(command))
}

pub struct Console {
    manager: Arc<BridgeManager>,
}

impl Console {
    pub fn new(manager: Arc<BridgeManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<BridgeManager> {
        &self.manager
    }

    /// Parse and execute one line. Blank lines yield `None`.
    pub fn handle_line(&self, line: &str) -> Option<CommandOutput> {
        match parse_command(line, self.manager.registry()) {
            Ok(Some(command)) => Some(self.execute(&command)),
            Ok(None) => None,
            Err(e) => Some(CommandOutput::error(&e)),
        }
    }

    pub fn execute(&self, command: &Command) -> CommandOutput {
        match command {
            Command::Add {
                parent,
                device_type_id,
                address,
            } => self.add(*parent, *device_type_id, *address).into(),
            Command::Remove(target) => self.remove(target).into(),
            Command::List => CommandOutput::ok(self.list()),
            Command::Support => CommandOutput::ok(self.support()),
            Command::Reset => self
                .manager
                .factory_reset()
                .map(|n| format!("removed {} bridged devices", n))
                .into(),
            Command::Help => CommandOutput::ok(format!("commands:\n{}", HELP)),
            Command::Quit => CommandOutput::ok("bye"),
        }
    }

    fn add(
        &self,
        parent: EndpointId,
        device_type_id: u32,
        address: Option<PhysicalAddress>,
    ) -> Result<String> {
        let address = address.unwrap_or_else(|| self.next_virtual_address());
        let endpoint_id = self.manager.create(parent, device_type_id, address, None)?;
        Ok(format!("bridged {} as endpoint {}", address, endpoint_id))
    }

    fn remove(&self, target: &RemoveTarget) -> Result<String> {
        match target {
            RemoveTarget::Endpoint(id) => {
                self.manager.remove(*id)?;
                Ok(format!("removed endpoint {}", id))
            }
            RemoveTarget::Address(address) => {
                let id = self.manager.remove_by_address(address)?;
                Ok(format!("removed {} from endpoint {}", address, id))
            }
        }
    }

    /// Lowest `virt:N` (N >= 1) not bridged yet.
    fn next_virtual_address(&self) -> PhysicalAddress {
        let used: HashSet<u32> = self
            .manager
            .records()
            .iter()
            .filter_map(|r| match r.address {
                PhysicalAddress::Virtual { id } => Some(id),
                _ => None,
            })
            .collect();
        let id = (1..=u32::MAX).find(|id| !used.contains(id)).unwrap_or(u32::MAX);
        PhysicalAddress::virtual_device(id)
    }

    fn list(&self) -> String {
        let records = self.manager.records();
        let mut text = format!(
            "{} of {} bridged devices",
            records.len(),
            self.manager.capacity()
        );
        for record in records {
            let name = self
                .manager
                .registry()
                .name(record.device_type_id)
                .unwrap_or("unknown");
            let _ = write!(
                text,
                "\n  endpoint {:<5} {:<24} (0x{:04X}) {} parent {}",
                record.endpoint_id,
                name,
                record.device_type_id,
                record.address,
                record.parent_endpoint_id
            );
        }
        text
    }

    fn support(&self) -> String {
        let registry = self.manager.registry();
        let mut text = format!("{} supported device types", registry.entries().len());
        for entry in registry.entries() {
            let _ = write!(text, "\n  0x{:04X} {}", entry.id, entry.name);
        }
        text
    }

    /// Prompt, read and answer lines until `quit` or end of input.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            writer.write_all(PROMPT.as_bytes()).await?;
            writer.flush().await?;
            let Some(line) = lines.next_line().await? else {
                writer.write_all(b"\n").await?;
                break;
            };
            let quit = matches!(
                parse_command(&line, self.manager.registry()),
                Ok(Some(Command::Quit))
            );
            if let Some(output) = self.handle_line(&line) {
                writer.write_all(output.text.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            if quit {
                break;
            }
        }
        writer.flush().await
    }
}

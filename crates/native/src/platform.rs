//! Platform tuples and binary header inspection.
//!
//! Component archives ship one shared library per platform under
//! `binaries/<tuple>/<model identifier>.<ext>`. A library built for another
//! word size or CPU cannot be mapped into this process; such components are
//! run through a companion process instead.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// The platform tuple of the running process, as used in archive layouts.
#[must_use]
pub fn platform_tuple() -> &'static str {
    match (std::env::consts::OS, cfg!(target_pointer_width = "64")) {
        ("windows", true) => "win64",
        ("windows", false) => "win32",
        ("macos", _) => "darwin64",
        (_, true) => "linux64",
        (_, false) => "linux32",
    }
}

/// File extension of shared libraries on this platform, without the dot.
#[must_use]
pub fn shared_library_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// Location of the host binary inside an unpacked archive.
#[must_use]
pub fn binary_path(unpacked: &Path, model_identifier: &str) -> PathBuf {
    unpacked
        .join("binaries")
        .join(platform_tuple())
        .join(format!("{model_identifier}.{}", shared_library_extension()))
}

/// Platform tuples other than the host's that carry a binary for
/// `model_identifier`.
#[must_use]
pub fn foreign_binaries(unpacked: &Path, model_identifier: &str) -> Vec<(String, PathBuf)> {
    let Ok(dirs) = std::fs::read_dir(unpacked.join("binaries")) else {
        return Vec::new();
    };
    let mut found: Vec<(String, PathBuf)> = dirs
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let tuple = entry.file_name().to_string_lossy().into_owned();
            if tuple == platform_tuple() {
                return None;
            }
            ["so", "dll", "dylib"]
                .iter()
                .map(|ext| entry.path().join(format!("{model_identifier}.{ext}")))
                .find(|path| path.is_file())
                .map(|path| (tuple, path))
        })
        .collect();
    found.sort();
    found
}

/// Whether the component can only be run out of process.
///
/// True when no binary for the host tuple exists, or the one that exists was
/// built for another architecture, while some other tuple has a binary.
#[must_use]
pub fn needs_remoting(unpacked: &Path, model_identifier: &str) -> bool {
    let host = binary_path(unpacked, model_identifier);
    if host.is_file() {
        return foreign_architecture(&host).is_some();
    }
    !foreign_binaries(unpacked, model_identifier).is_empty()
}

/// Describes the binary at `path` if its header names another platform.
///
/// Returns `None` when the binary matches the host or its header cannot be
/// classified; the loader then has the final word.
pub(crate) fn foreign_architecture(path: &Path) -> Option<String> {
    let mut header = Vec::with_capacity(1024);
    File::open(path)
        .ok()?
        .take(1024)
        .read_to_end(&mut header)
        .ok()?;

    let found = classify(&header)?;
    let host = host_architecture();
    (found != host).then(|| found.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Architecture {
    format: &'static str,
    cpu: &'static str,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.format, self.cpu)
    }
}

fn host_architecture() -> Architecture {
    let format = match std::env::consts::OS {
        "windows" => "pe",
        "macos" | "ios" => "macho",
        _ => "elf",
    };
    let cpu = match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "x86" => "x86",
        "aarch64" => "aarch64",
        "arm" => "arm",
        _ => "other",
    };
    Architecture { format, cpu }
}

fn classify(header: &[u8]) -> Option<Architecture> {
    if header.starts_with(b"\x7fELF") {
        return classify_elf(header);
    }
    if header.starts_with(b"MZ") {
        return classify_pe(header);
    }
    classify_macho(header)
}

fn classify_elf(header: &[u8]) -> Option<Architecture> {
    let machine = header.get(18..20)?;
    let machine = match header.get(5)? {
        1 => LittleEndian::read_u16(machine),
        2 => BigEndian::read_u16(machine),
        _ => return None,
    };
    let cpu = match machine {
        0x03 => "x86",
        0x3E => "x86_64",
        0x28 => "arm",
        0xB7 => "aarch64",
        _ => "other",
    };
    Some(Architecture { format: "elf", cpu })
}

fn classify_pe(header: &[u8]) -> Option<Architecture> {
    let offset = LittleEndian::read_u32(header.get(0x3C..0x40)?) as usize;
    let signature = header.get(offset..offset + 4)?;
    if signature != b"PE\0\0" {
        return None;
    }
    let cpu = match LittleEndian::read_u16(header.get(offset + 4..offset + 6)?) {
        0x014C => "x86",
        0x8664 => "x86_64",
        0x01C4 => "arm",
        0xAA64 => "aarch64",
        _ => "other",
    };
    Some(Architecture { format: "pe", cpu })
}

fn classify_macho(header: &[u8]) -> Option<Architecture> {
    let magic = header.get(0..4)?;
    // Universal binaries hold several slices; let the loader pick one.
    let cputype = match magic {
        [0xCF, 0xFA, 0xED, 0xFE] | [0xCE, 0xFA, 0xED, 0xFE] => {
            LittleEndian::read_u32(header.get(4..8)?)
        }
        [0xFE, 0xED, 0xFA, 0xCF] | [0xFE, 0xED, 0xFA, 0xCE] => {
            BigEndian::read_u32(header.get(4..8)?)
        }
        _ => return None,
    };
    let cpu = match cputype {
        7 => "x86",
        0x0100_0007 => "x86_64",
        12 => "arm",
        0x0100_000C => "aarch64",
        _ => "other",
    };
    Some(Architecture {
        format: "macho",
        cpu,
    })
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mach-O probing.

Encrypted App Store binaries carry an `LC_ENCRYPTION_INFO` (or
`LC_ENCRYPTION_INFO_64`) load command whose `cryptid` field is non-zero.
Rewriting load commands or signatures of such binaries produces something
that will not run, so callers need to detect them up front.
*/

use {
    crate::error::TweakError,
    goblin::mach::{cputype::get_arch_name_from_types, load_command::CommandVariant, Mach, MachO},
};

fn macho_is_encrypted(macho: &MachO) -> bool {
    macho.load_commands.iter().any(|lc| match &lc.command {
        CommandVariant::EncryptionInfo32(command) => command.cryptid != 0,
        CommandVariant::EncryptionInfo64(command) => command.cryptid != 0,
        _ => false,
    })
}

fn macho_arch_name(macho: &MachO) -> String {
    get_arch_name_from_types(macho.header.cputype(), macho.header.cpusubtype())
        .map(|x| x.to_string())
        .unwrap_or_else(|| format!("cpu-{}", macho.header.cputype()))
}

/// Whether any Mach-O slice in `data` is encrypted.
pub fn is_encrypted(data: &[u8]) -> Result<bool, TweakError> {
    match Mach::parse(data)? {
        Mach::Binary(macho) => Ok(macho_is_encrypted(&macho)),
        Mach::Fat(multiarch) => {
            for index in 0..multiarch.narches {
                if macho_is_encrypted(&multiarch.get(index)?) {
                    return Ok(true);
                }
            }

            Ok(false)
        }
    }
}

/// Resolve the architecture names of every slice in `data`.
///
/// Single architecture binaries yield a single entry.
pub fn architectures(data: &[u8]) -> Result<Vec<String>, TweakError> {
    match Mach::parse(data)? {
        Mach::Binary(macho) => Ok(vec![macho_arch_name(&macho)]),
        Mach::Fat(multiarch) => (0..multiarch.narches)
            .map(|index| Ok(macho_arch_name(&multiarch.get(index)?)))
            .collect::<Result<Vec<_>, TweakError>>(),
    }
}

/// Whether `data` is a fat/universal Mach-O.
pub fn is_universal(data: &[u8]) -> Result<bool, TweakError> {
    Ok(matches!(Mach::parse(data)?, Mach::Fat(_)))
}

//! Front-end contract: what the core consumes from the lifter and the
//! analysis host.
//!
//! The host's command channel (`query_text` / `query_json`) lives in the
//! wrapper layer and never reaches the core; only its parsed output does,
//! as the descriptor types here. Architecture-specific lifters implement
//! [`Lifter`] to turn per-block instruction listings into IR statements.

use serde::{Deserialize, Serialize};

use crate::error::DecompileError;
use crate::ir::{ArchInfo, BlockId, Function, FunctionBuilder, Param, ParamLoc};

/// Per-function metadata from the analysis host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDescriptor {
    pub addr: u64,
    pub name: String,
    #[serde(default)]
    pub min_addr: u64,
    #[serde(default)]
    pub max_addr: u64,
    /// Return type hint, carried opaquely.
    #[serde(default, rename = "type")]
    pub return_type: String,
    #[serde(default)]
    pub args: Vec<ArgDescriptor>,
    #[serde(default)]
    pub blocks: Vec<BlockDescriptor>,
}

/// Argument / local descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArgDescriptor {
    pub name: String,
    pub kind: ArgKind,
    #[serde(rename = "ref")]
    pub location: LocationRef,
    #[serde(default, rename = "type")]
    pub type_hint: String,
    #[serde(default)]
    pub size: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    /// Formal argument.
    Arg,
    /// Register-resident value.
    Reg,
    /// Stack-resident local.
    Var,
}

/// Where a described value lives: a register name or a base+offset slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LocationRef {
    Register(String),
    Stack { base: String, offset: i64 },
}

/// Per-block descriptor from the analysis host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockDescriptor {
    pub addr: u64,
    #[serde(default)]
    pub jump: Option<u64>,
    #[serde(default)]
    pub fail: Option<u64>,
    /// Switch target addresses, in case order.
    #[serde(default)]
    pub cases: Vec<u64>,
    /// Raw switch operand description, carried opaquely for the lifter.
    #[serde(default)]
    pub switch_op: Option<serde_json::Value>,
    #[serde(default)]
    pub entry: bool,
    #[serde(default)]
    pub exit: bool,
    /// Disassembled instructions in the host's JSON form; consumed by the
    /// arch-specific lifter, opaque to the core.
    #[serde(default)]
    pub instructions: Vec<serde_json::Value>,
}

/// An architecture-specific instruction lifter.
pub trait Lifter {
    fn arch(&self) -> &'static str;

    fn arch_info(&self) -> ArchInfo;

    /// Lifts one block's instructions into statements appended to the
    /// block's container.
    fn lift_block(
        &self,
        func: &mut Function,
        block: BlockId,
        desc: &BlockDescriptor,
    ) -> Result<(), DecompileError>;
}

/// Selects a lifter for the architecture, or reports [`DecompileError::UnknownArch`].
pub fn select_lifter<'a>(
    lifters: &'a [&'a dyn Lifter],
    arch: &str,
) -> Result<&'a dyn Lifter, DecompileError> {
    lifters
        .iter()
        .copied()
        .find(|l| l.arch() == arch)
        .ok_or_else(|| DecompileError::UnknownArch(arch.to_string()))
}

/// Calling conventions the mid-end knows how to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    Cdecl,
    Stdcall,
    SysV64,
    Aapcs64,
}

impl CallConv {
    /// Resolves a host-reported convention name for a call site.
    pub fn lookup(name: &str, addr: u64) -> Result<CallConv, DecompileError> {
        Ok(match name {
            "cdecl" => CallConv::Cdecl,
            "stdcall" => CallConv::Stdcall,
            "sysv" | "amd64" => CallConv::SysV64,
            "aapcs64" | "arm64" => CallConv::Aapcs64,
            _ => {
                return Err(DecompileError::UnknownCallConv {
                    conv: name.to_string(),
                    addr,
                })
            }
        })
    }

    /// Registers carrying the leading integer arguments.
    pub fn arg_registers(self) -> &'static [&'static str] {
        match self {
            CallConv::Cdecl | CallConv::Stdcall => &[],
            CallConv::SysV64 => &["rdi", "rsi", "rdx", "rcx", "r8", "r9"],
            CallConv::Aapcs64 => &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
        }
    }
}

/// Builds the block skeleton of a function from its descriptor and runs
/// the lifter over each block.
pub fn build_function(
    desc: &FunctionDescriptor,
    lifter: &dyn Lifter,
) -> Result<Function, DecompileError> {
    let mut fb = FunctionBuilder::new(desc.addr, &desc.name);
    let mut ids = Vec::with_capacity(desc.blocks.len());
    for bd in &desc.blocks {
        ids.push(fb.add_block(bd.addr));
    }
    for (i, bd) in desc.blocks.iter().enumerate() {
        let from = ids[i];
        if bd.entry {
            fb.set_entry(from);
        }
        if bd.exit {
            fb.mark_exit(from);
        }
        if let Some(target) = bd.jump {
            if let Some(&to) = lookup(&desc.blocks, &ids, target) {
                fb.jump(from, to);
            }
        }
        if let Some(target) = bd.fail {
            if let Some(&to) = lookup(&desc.blocks, &ids, target) {
                fb.fail(from, to);
            }
        }
        for &case in &bd.cases {
            if let Some(&to) = lookup(&desc.blocks, &ids, case) {
                fb.case(from, to);
            }
        }
    }

    let mut func = fb.finish();
    func.return_type = desc.return_type.clone();
    func.arch = Some(lifter.arch_info());
    for arg in &desc.args {
        let param = Param {
            name: arg.name.clone(),
            size: if arg.size == 0 { 64 } else { arg.size },
            loc: match &arg.location {
                LocationRef::Register(r) => ParamLoc::Register(r.clone()),
                LocationRef::Stack { base, offset } => ParamLoc::Stack {
                    base: base.clone(),
                    offset: *offset,
                },
            },
            type_hint: arg.type_hint.clone(),
        };
        match arg.kind {
            ArgKind::Arg | ArgKind::Reg => func.args.push(param),
            ArgKind::Var => func.locals.push(param),
        }
    }

    for (i, bd) in desc.blocks.iter().enumerate() {
        lifter.lift_block(&mut func, ids[i], bd)?;
    }
    Ok(func)
}

fn lookup<'a>(blocks: &[BlockDescriptor], ids: &'a [BlockId], addr: u64) -> Option<&'a BlockId> {
    blocks
        .iter()
        .position(|b| b.addr == addr)
        .map(|i| &ids[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_host_json() {
        let json = r#"{
            "addr": 4096,
            "name": "main",
            "type": "int",
            "args": [
                {"name": "argc", "kind": "arg", "ref": "rdi", "type": "int", "size": 32},
                {"name": "local_8", "kind": "var", "ref": {"base": "rbp", "offset": -8}}
            ],
            "blocks": [
                {"addr": 4096, "jump": 4112, "entry": true},
                {"addr": 4112, "exit": true}
            ]
        }"#;
        let desc: FunctionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.addr, 4096);
        assert_eq!(desc.args.len(), 2);
        assert_eq!(desc.args[0].location, LocationRef::Register("rdi".into()));
        assert_eq!(
            desc.args[1].location,
            LocationRef::Stack {
                base: "rbp".into(),
                offset: -8
            }
        );
        assert_eq!(desc.blocks[0].jump, Some(4112));
        assert!(desc.blocks[1].exit);
    }

    #[test]
    fn test_unknown_callconv_is_an_error() {
        let err = CallConv::lookup("watcall", 0x1000).unwrap_err();
        match err {
            DecompileError::UnknownCallConv { conv, addr } => {
                assert_eq!(conv, "watcall");
                assert_eq!(addr, 0x1000);
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_select_lifter_unknown_arch() {
        let lifters: [&dyn Lifter; 0] = [];
        let err = match select_lifter(&lifters, "m68k") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, DecompileError::UnknownArch(a) if a == "m68k"));
    }
}

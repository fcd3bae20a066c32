//! Instruction classification: which color each part of a row is drawn in.

use std::fmt;

use clap::ValueEnum;

use crate::{Insn, Rgba};

/// Opcode colors indexed by the sum of an instruction's group tags.
/// The first entry marks invalid/unclassified instructions.
pub const GROUP_PALETTE: [Rgba; 6] = [
    Rgba::opaque(0xff0000), // invalid
    Rgba::opaque(0xffff00), // jump
    Rgba::opaque(0xaaaa00), // call
    Rgba::opaque(0x00ffff), // ret
    Rgba::opaque(0xff00ff), // int
    Rgba::opaque(0x00aaaa), // iret
];

const NEUTRAL: Rgba = Rgba::WHITE;
const OPCODE: Rgba = Rgba::opaque(0xffaaff);
const OPERAND: Rgba = Rgba::opaque(0xaaffff);
const RAW_BYTES: Rgba = Rgba::opaque(0xffffaa);
const POSITION: Rgba = Rgba::opaque(0xaaffaa);

/// Coloring policy selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorPolicy {
    /// Fixed color per row element
    #[default]
    Simple,
    /// Opcode colored by instruction group (enables detail decoding)
    Group,
    /// Everything drawn in one neutral color
    None,
}

impl fmt::Display for ColorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorPolicy::Simple => write!(f, "simple"),
            ColorPolicy::Group => write!(f, "group"),
            ColorPolicy::None => write!(f, "none"),
        }
    }
}

/// The part of a listing row a color is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Opcode,
    Operand,
    RawBytes,
    Position,
}

/// Maps (instruction, role) pairs to colors under a fixed policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classifier {
    policy: ColorPolicy,
}

impl Classifier {
    pub fn new(policy: ColorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ColorPolicy {
        self.policy
    }

    /// Whether the disassembler must attach detail (group) information.
    pub fn needs_detail(&self) -> bool {
        self.policy == ColorPolicy::Group
    }

    pub fn color_for(&self, insn: &Insn, role: Role) -> Rgba {
        match (self.policy, role) {
            (ColorPolicy::None, _) => NEUTRAL,
            (ColorPolicy::Group, Role::Opcode) => group_color(insn),
            (_, Role::Opcode) => OPCODE,
            (_, Role::Operand) => OPERAND,
            (_, Role::RawBytes) => RAW_BYTES,
            (_, Role::Position) => POSITION,
        }
    }
}

fn group_color(insn: &Insn) -> Rgba {
    if !insn.detail {
        return OPCODE;
    }

    let sum: usize = insn.groups.iter().map(|&g| g as usize).sum();
    GROUP_PALETTE[sum % GROUP_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample() -> Insn {
        Insn::new(0x1000, &[0xe8, 0, 0, 0, 0], "call", "0x1005")
    }

    const ROLES: [Role; 4] = [Role::Opcode, Role::Operand, Role::RawBytes, Role::Position];

    #[test]
    fn test_none_is_single_color() {
        let c = Classifier::new(ColorPolicy::None);
        let grouped = sample().with_groups(&[1, 2]);

        for role in ROLES {
            assert_eq!(c.color_for(&sample(), role), Rgba::WHITE);
            assert_eq!(c.color_for(&grouped, role), Rgba::WHITE);
        }
    }

    #[rstest]
    #[case(Role::Opcode, OPCODE)]
    #[case(Role::Operand, OPERAND)]
    #[case(Role::RawBytes, RAW_BYTES)]
    #[case(Role::Position, POSITION)]
    fn test_simple_colors_ignore_content(#[case] role: Role, #[case] expected: Rgba) {
        let c = Classifier::new(ColorPolicy::Simple);

        assert_eq!(c.color_for(&sample(), role), expected);
        assert_eq!(c.color_for(&sample().with_groups(&[4]), role), expected);
    }

    #[rstest]
    #[case(&[], GROUP_PALETTE[0])]
    #[case(&[1], GROUP_PALETTE[1])]
    #[case(&[1, 2], GROUP_PALETTE[3])]
    #[case(&[2, 7], GROUP_PALETTE[3])]
    #[case(&[6], GROUP_PALETTE[0])]
    fn test_group_palette_index(#[case] groups: &[u8], #[case] expected: Rgba) {
        let c = Classifier::new(ColorPolicy::Group);
        let insn = sample().with_groups(groups);

        assert_eq!(c.color_for(&insn, Role::Opcode), expected);
    }

    #[test]
    fn test_group_without_detail_falls_back() {
        let c = Classifier::new(ColorPolicy::Group);

        assert_eq!(c.color_for(&sample(), Role::Opcode), OPCODE);
        assert_eq!(c.color_for(&sample(), Role::Operand), OPERAND);
        assert!(c.needs_detail());
        assert!(!Classifier::new(ColorPolicy::Simple).needs_detail());
    }
}

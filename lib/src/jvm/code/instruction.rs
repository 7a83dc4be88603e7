//! Instructions of JVM bytecode. The representation is slightly different from the usual
//! presentation to make it more convenient to construct and analyze bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Families of instructions (shifts, comparisons, invokes, conditional branches) are one
//!     variant with a field.
//!
//!   - Short and long forms of the same instruction (`ldc` and `ldc_w`, `iload_0` and `iload`)
//!     are one variant. The encoding is chosen from the operand.

use crate::jvm::class_file::{ClassConstantIndex, Constant, ConstantIndex, SymbolTable};
use crate::jvm::{BaseType, Error, FieldType, MethodDescriptor, Serialize};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::Result as IoResult;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Instruction {
    #[default]
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantIndex), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantIndex),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(ConstantIndex),
    PutStatic(ConstantIndex),
    GetField(ConstantIndex),
    PutField(ConstantIndex),
    Invoke(InvokeType, ConstantIndex),
    InvokeDynamic(ConstantIndex),
    New(ClassConstantIndex),
    NewArray(BaseType),
    ANewArray(ClassConstantIndex),
    ArrayLength,
    CheckCast(ClassConstantIndex),
    InstanceOf(ClassConstantIndex),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(ClassConstantIndex, u8),
}

impl Instruction {
    /// Number of operand stack slots popped and then pushed by the instruction
    ///
    /// Field and method instructions look their descriptors up in the symbol table.
    pub fn stack_effect(&self, symbols: &SymbolTable) -> Result<(usize, usize), Error> {
        use Instruction::*;

        Ok(match self {
            Nop | IInc(_, _) => (0, 0),
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) => (0, 1),
            LConst0 | LConst1 | DConst0 | DConst1 => (0, 2),
            Ldc(idx) | Ldc2(idx) => (0, constant_width(symbols, *idx)?),
            ILoad(_) | FLoad(_) | ALoad(_) => (0, 1),
            LLoad(_) | DLoad(_) => (0, 2),
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
            LALoad | DALoad => (2, 2),
            IStore(_) | FStore(_) | AStore(_) => (1, 0),
            LStore(_) | DStore(_) => (2, 0),
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
            LAStore | DAStore => (4, 0),
            Pop => (1, 0),
            Pop2 => (2, 0),
            Dup => (1, 2),
            DupX1 => (2, 3),
            DupX2 => (3, 4),
            Dup2 => (2, 4),
            Dup2X1 => (3, 5),
            Dup2X2 => (4, 6),
            Swap => (2, 2),
            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem | ISh(_)
            | IAnd | IOr | IXor => (2, 1),
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem | LAnd | LOr
            | LXor => (4, 2),
            LSh(_) => (3, 2),
            INeg | FNeg => (1, 1),
            LNeg | DNeg => (2, 2),
            I2F | F2I | I2B | I2C | I2S => (1, 1),
            I2L | I2D | F2L | F2D => (1, 2),
            L2I | L2F | D2I | D2F => (2, 1),
            L2D | D2L => (2, 2),
            LCmp | DCmp(_) => (4, 1),
            FCmp(_) => (2, 1),
            GetStatic(field) => (0, field_width(symbols, *field)?),
            PutStatic(field) => (field_width(symbols, *field)?, 0),
            GetField(field) => (1, field_width(symbols, *field)?),
            PutField(field) => (1 + field_width(symbols, *field)?, 0),
            Invoke(invoke_type, method) => {
                let descriptor = method_descriptor(symbols.member_ref(*method)?.descriptor)?;
                let has_receiver = !matches!(invoke_type, InvokeType::Static);
                (
                    descriptor.parameter_length(has_receiver),
                    descriptor.return_width(),
                )
            }
            InvokeDynamic(call_site) => {
                let (_, descriptor) = symbols.dynamic_name_and_type(*call_site)?;
                let descriptor = method_descriptor(descriptor)?;
                (descriptor.parameter_length(false), descriptor.return_width())
            }
            New(_) => (0, 1),
            NewArray(_) | ANewArray(_) => (1, 1),
            ArrayLength => (1, 1),
            CheckCast(_) | InstanceOf(_) => (1, 1),
            MonitorEnter | MonitorExit => (1, 0),
            MultiANewArray(_, dimensions) => (*dimensions as usize, 1),
        })
    }

    /// Local variable slots touched by the instruction, as `(index, width)`
    pub fn local_access(&self) -> Option<(u16, usize)> {
        use Instruction::*;

        match self {
            ILoad(idx) | FLoad(idx) | ALoad(idx) | IStore(idx) | FStore(idx) | AStore(idx)
            | IInc(idx, _) => Some((*idx, 1)),
            LLoad(idx) | DLoad(idx) | LStore(idx) | DStore(idx) => Some((*idx, 2)),
            _ => None,
        }
    }
}

/// Stack width of a loadable constant
fn constant_width(symbols: &SymbolTable, index: ConstantIndex) -> Result<usize, Error> {
    match symbols.get(index)? {
        Constant::Long(_) | Constant::Double(_) => Ok(2),
        Constant::Dynamic { .. } => {
            let (_, descriptor) = symbols.dynamic_name_and_type(index)?;
            Ok(field_type(descriptor)?.width())
        }
        _ => Ok(1),
    }
}

fn field_width(symbols: &SymbolTable, field: ConstantIndex) -> Result<usize, Error> {
    Ok(field_type(symbols.member_ref(field)?.descriptor)?.width())
}

pub(crate) fn field_type(descriptor: &str) -> Result<FieldType, Error> {
    FieldType::parse(descriptor)
}

pub(crate) fn method_descriptor(descriptor: &str) -> Result<MethodDescriptor, Error> {
    MethodDescriptor::parse(descriptor)
}

impl Instruction {
    /// Opcode byte, not counting any `wide` prefix
    ///
    /// Load, store, and `ldc` instructions pick their short form when the operand allows it.
    pub fn opcode(&self) -> u8 {
        use Instruction::*;

        match self {
            Nop => 0x00,
            AConstNull => 0x01,
            IConstM1 => 0x02,
            IConst0 => 0x03,
            IConst1 => 0x04,
            IConst2 => 0x05,
            IConst3 => 0x06,
            IConst4 => 0x07,
            IConst5 => 0x08,
            LConst0 => 0x09,
            LConst1 => 0x0a,
            FConst0 => 0x0b,
            FConst1 => 0x0c,
            FConst2 => 0x0d,
            DConst0 => 0x0e,
            DConst1 => 0x0f,
            BiPush(_) => 0x10,
            SiPush(_) => 0x11,
            Ldc(idx) if idx.0 <= 0xff => 0x12,
            Ldc(_) => 0x13,
            Ldc2(_) => 0x14,
            ILoad(idx) => local_opcode(0x15, *idx),
            LLoad(idx) => local_opcode(0x16, *idx),
            FLoad(idx) => local_opcode(0x17, *idx),
            DLoad(idx) => local_opcode(0x18, *idx),
            ALoad(idx) => local_opcode(0x19, *idx),
            IALoad => 0x2e,
            LALoad => 0x2f,
            FALoad => 0x30,
            DALoad => 0x31,
            AALoad => 0x32,
            BALoad => 0x33,
            CALoad => 0x34,
            SALoad => 0x35,
            IStore(idx) => local_opcode(0x36, *idx),
            LStore(idx) => local_opcode(0x37, *idx),
            FStore(idx) => local_opcode(0x38, *idx),
            DStore(idx) => local_opcode(0x39, *idx),
            AStore(idx) => local_opcode(0x3a, *idx),
            IAStore => 0x4f,
            LAStore => 0x50,
            FAStore => 0x51,
            DAStore => 0x52,
            AAStore => 0x53,
            BAStore => 0x54,
            CAStore => 0x55,
            SAStore => 0x56,
            Pop => 0x57,
            Pop2 => 0x58,
            Dup => 0x59,
            DupX1 => 0x5a,
            DupX2 => 0x5b,
            Dup2 => 0x5c,
            Dup2X1 => 0x5d,
            Dup2X2 => 0x5e,
            Swap => 0x5f,
            IAdd => 0x60,
            LAdd => 0x61,
            FAdd => 0x62,
            DAdd => 0x63,
            ISub => 0x64,
            LSub => 0x65,
            FSub => 0x66,
            DSub => 0x67,
            IMul => 0x68,
            LMul => 0x69,
            FMul => 0x6a,
            DMul => 0x6b,
            IDiv => 0x6c,
            LDiv => 0x6d,
            FDiv => 0x6e,
            DDiv => 0x6f,
            IRem => 0x70,
            LRem => 0x71,
            FRem => 0x72,
            DRem => 0x73,
            INeg => 0x74,
            LNeg => 0x75,
            FNeg => 0x76,
            DNeg => 0x77,
            ISh(ShiftType::Left) => 0x78,
            LSh(ShiftType::Left) => 0x79,
            ISh(ShiftType::ArithmeticRight) => 0x7a,
            LSh(ShiftType::ArithmeticRight) => 0x7b,
            ISh(ShiftType::LogicalRight) => 0x7c,
            LSh(ShiftType::LogicalRight) => 0x7d,
            IAnd => 0x7e,
            LAnd => 0x7f,
            IOr => 0x80,
            LOr => 0x81,
            IXor => 0x82,
            LXor => 0x83,
            IInc(_, _) => 0x84,
            I2L => 0x85,
            I2F => 0x86,
            I2D => 0x87,
            L2I => 0x88,
            L2F => 0x89,
            L2D => 0x8a,
            F2I => 0x8b,
            F2L => 0x8c,
            F2D => 0x8d,
            D2I => 0x8e,
            D2L => 0x8f,
            D2F => 0x90,
            I2B => 0x91,
            I2C => 0x92,
            I2S => 0x93,
            LCmp => 0x94,
            FCmp(CompareMode::L) => 0x95,
            FCmp(CompareMode::G) => 0x96,
            DCmp(CompareMode::L) => 0x97,
            DCmp(CompareMode::G) => 0x98,
            GetStatic(_) => 0xb2,
            PutStatic(_) => 0xb3,
            GetField(_) => 0xb4,
            PutField(_) => 0xb5,
            Invoke(InvokeType::Virtual, _) => 0xb6,
            Invoke(InvokeType::Special, _) => 0xb7,
            Invoke(InvokeType::Static, _) => 0xb8,
            Invoke(InvokeType::Interface(_), _) => 0xb9,
            InvokeDynamic(_) => 0xba,
            New(_) => 0xbb,
            NewArray(_) => 0xbc,
            ANewArray(_) => 0xbd,
            ArrayLength => 0xbe,
            CheckCast(_) => 0xc0,
            InstanceOf(_) => 0xc1,
            MonitorEnter => 0xc2,
            MonitorExit => 0xc3,
            MultiANewArray(_, _) => 0xc5,
        }
    }

    /// Local variable index of a load or store
    fn load_store_index(&self) -> Option<u16> {
        use Instruction::*;

        match self {
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IStore(idx)
            | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Whether the operands are too large for the regular encoding
    fn is_wide(&self) -> bool {
        match self {
            Instruction::IInc(idx, diff) => *idx > 0xff || i8::try_from(*diff).is_err(),
            other => matches!(other.load_store_index(), Some(idx) if idx > 0xff),
        }
    }

    /// Bytes of operands following the opcode
    fn operand_width(&self) -> usize {
        use Instruction::*;

        let wide = self.is_wide();
        if let Some(idx) = self.load_store_index() {
            return match idx {
                0..=3 => 0,
                _ if wide => 2,
                _ => 1,
            };
        }
        match self {
            BiPush(_) | NewArray(_) => 1,
            Ldc(_) if self.opcode() == 0x12 => 1,
            SiPush(_) | Ldc(_) | Ldc2(_) | GetStatic(_) | PutStatic(_) | GetField(_)
            | PutField(_) | New(_) | ANewArray(_) | CheckCast(_) | InstanceOf(_) => 2,
            Invoke(InvokeType::Interface(_), _) | InvokeDynamic(_) => 4,
            Invoke(_, _) => 2,
            IInc(_, _) if wide => 4,
            IInc(_, _) => 2,
            MultiANewArray(_, _) => 3,
            _ => 0,
        }
    }
}

/// Loads and stores of locals 0 to 3 have dedicated opcodes
fn local_opcode(normal_form: u8, idx: u16) -> u8 {
    match idx {
        0..=3 if normal_form < 0x36 => 0x1a + 4 * (normal_form - 0x15) + idx as u8,
        0..=3 => 0x3b + 4 * (normal_form - 0x36) + idx as u8,
        _ => normal_form,
    }
}

/// Prefix widening the local index (and `iinc` increment) of the next instruction
const WIDE: u8 = 0xc4;

impl Width for Instruction {
    fn width(&self) -> usize {
        usize::from(self.is_wide()) + 1 + self.operand_width()
    }
}

impl Serialize for Instruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        use Instruction::*;

        let wide = self.is_wide();
        if wide {
            WIDE.serialize(writer)?;
        }
        self.opcode().serialize(writer)?;

        if let Some(idx) = self.load_store_index() {
            return match idx {
                0..=3 => Ok(()),
                _ if wide => idx.serialize(writer),
                _ => (idx as u8).serialize(writer),
            };
        }
        match self {
            BiPush(byte) => byte.serialize(writer),
            SiPush(short) => short.serialize(writer),
            Ldc(idx) => match u8::try_from(idx.0) {
                Ok(narrow) => narrow.serialize(writer),
                Err(_) => idx.serialize(writer),
            },
            Ldc2(idx) | GetStatic(idx) | PutStatic(idx) | GetField(idx) | PutField(idx) => {
                idx.serialize(writer)
            }
            Invoke(InvokeType::Interface(count), idx) => {
                idx.serialize(writer)?;
                count.serialize(writer)?;
                0u8.serialize(writer)
            }
            Invoke(_, idx) => idx.serialize(writer),
            InvokeDynamic(idx) => {
                idx.serialize(writer)?;
                0u16.serialize(writer)
            }
            IInc(idx, diff) if wide => {
                idx.serialize(writer)?;
                diff.serialize(writer)
            }
            IInc(idx, diff) => {
                (*idx as u8).serialize(writer)?;
                (*diff as i8).serialize(writer)
            }
            New(class) | ANewArray(class) | CheckCast(class) | InstanceOf(class) => {
                class.serialize(writer)
            }
            NewArray(base_type) => array_type_code(*base_type).serialize(writer),
            MultiANewArray(class, dimensions) => {
                class.serialize(writer)?;
                dimensions.serialize(writer)
            }
            _ => Ok(()),
        }
    }
}

/// `atype` operand of `newarray`
pub fn array_type_code(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Boolean => 4,
        BaseType::Char => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Byte => 8,
        BaseType::Short => 9,
        BaseType::Int => 10,
        BaseType::Long => 11,
    }
}

/// Inverse of [`array_type_code`]
pub fn array_type_from_code(atype: u8) -> Option<BaseType> {
    Some(match atype {
        4 => BaseType::Boolean,
        5 => BaseType::Char,
        6 => BaseType::Float,
        7 => BaseType::Double,
        8 => BaseType::Byte,
        9 => BaseType::Short,
        10 => BaseType::Int,
        11 => BaseType::Long,
        _ => return None,
    })
}

/// Instruction that ends a basic block
///
/// Labels come in three flavours, each its own type parameter: `Lbl` for targets encoded in 16
/// bits, `LblWide` for targets encoded in 32 bits (`goto_w`, `jsr_w`, switches), and `LblNext` for
/// the block control falls into. While building they are all block ids. Just before writing,
/// `Lbl` and `LblWide` become relative offsets and `LblNext` becomes `()`, since the next block is
/// implied by the layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl, LblWide, LblNext> {
    /// `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    If(OrdComparison, Lbl, LblNext),

    /// `if_icmp<cond>`
    IfICmp(OrdComparison, Lbl, LblNext),

    /// `if_acmpeq`, `if_acmpne`
    IfACmp(EqComparison, Lbl, LblNext),

    Goto(Lbl),
    GotoW(LblWide),

    /// Jump to a subroutine, which returns (with `ret`) to the next block
    Jsr(Lbl, LblNext),
    JsrW(LblWide, LblNext),

    /// Return from a subroutine, using the address stored in a local variable
    Ret(u16),

    TableSwitch {
        /// Zero bytes after the opcode, so that `default` is 4-byte aligned within the method
        padding: u8,
        default: LblWide,

        /// Key of `targets[0]`
        low: i32,
        targets: Vec<LblWide>,
    },
    LookupSwitch {
        /// Zero bytes after the opcode, so that `default` is 4-byte aligned within the method
        padding: u8,
        default: LblWide,

        /// Ascending by key
        targets: Vec<(i32, LblWide)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,

    /// `ifnull` (`EQ`) and `ifnonnull` (`NE`)
    IfNull(EqComparison, Lbl, LblNext),

    /// Block falls into the next one without any instruction. Writes nothing.
    FallThrough(LblNext),

    /// Last block of a code stream that stops without a terminal instruction. Writes nothing.
    End,
}

impl<Lbl: Copy, LblWide: Copy, LblNext: Copy> BranchInstruction<Lbl, LblWide, LblNext> {
    /// Block that control continues into when the branch is not taken
    ///
    /// The return site of `jsr` counts.
    pub fn fallthrough_target(&self) -> Option<LblNext> {
        use BranchInstruction::*;

        match self {
            If(_, _, next)
            | IfICmp(_, _, next)
            | IfACmp(_, _, next)
            | IfNull(_, _, next)
            | Jsr(_, next)
            | JsrW(_, next)
            | FallThrough(next) => Some(*next),
            _ => None,
        }
    }

    /// Targets reached by taking the branch
    pub fn jump_targets(&self) -> JumpTargets<Lbl, LblWide> {
        use BranchInstruction::*;

        match self {
            If(_, lbl, _) | IfICmp(_, lbl, _) | IfACmp(_, lbl, _) | IfNull(_, lbl, _) => {
                JumpTargets::Regular(*lbl)
            }
            Goto(lbl) | Jsr(lbl, _) => JumpTargets::Regular(*lbl),
            GotoW(wide) | JsrW(wide, _) => JumpTargets::Wide(*wide),
            TableSwitch {
                default, targets, ..
            } => JumpTargets::WideMany(
                std::iter::once(*default)
                    .chain(targets.iter().copied())
                    .collect(),
            ),
            LookupSwitch {
                default, targets, ..
            } => JumpTargets::WideMany(
                std::iter::once(*default)
                    .chain(targets.iter().map(|(_, target)| *target))
                    .collect(),
            ),
            Ret(_) | IReturn | LReturn | FReturn | DReturn | AReturn | Return | AThrow
            | FallThrough(_) | End => JumpTargets::None,
        }
    }

    pub fn map_labels<Lbl2, LblWide2, LblNext2>(
        &self,
        map_label: impl FnOnce(&Lbl) -> Lbl2,
        map_wide_label: impl Fn(&LblWide) -> LblWide2,
        map_next_label: impl FnOnce(&LblNext) -> LblNext2,
    ) -> BranchInstruction<Lbl2, LblWide2, LblNext2> {
        use BranchInstruction::*;

        match self {
            If(comp, lbl, next) => If(*comp, map_label(lbl), map_next_label(next)),
            IfICmp(comp, lbl, next) => IfICmp(*comp, map_label(lbl), map_next_label(next)),
            IfACmp(comp, lbl, next) => IfACmp(*comp, map_label(lbl), map_next_label(next)),
            IfNull(comp, lbl, next) => IfNull(*comp, map_label(lbl), map_next_label(next)),
            Goto(lbl) => Goto(map_label(lbl)),
            GotoW(wide) => GotoW(map_wide_label(wide)),
            Jsr(lbl, next) => Jsr(map_label(lbl), map_next_label(next)),
            JsrW(wide, next) => JsrW(map_wide_label(wide), map_next_label(next)),
            Ret(var) => Ret(*var),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_wide_label(default),
                low: *low,
                targets: targets.iter().map(&map_wide_label).collect(),
            },
            LookupSwitch {
                padding,
                default,
                targets,
            } => LookupSwitch {
                padding: *padding,
                default: map_wide_label(default),
                targets: targets
                    .iter()
                    .map(|(key, wide)| (*key, map_wide_label(wide)))
                    .collect(),
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            FallThrough(next) => FallThrough(map_next_label(next)),
            End => End,
        }
    }
}

impl<Lbl, LblWide, LblNext> BranchInstruction<Lbl, LblWide, LblNext> {
    /// Update the alignment padding of a switch (other branches are left alone)
    pub fn set_padding(&mut self, new_padding: u8) {
        if let BranchInstruction::TableSwitch { padding, .. }
        | BranchInstruction::LookupSwitch { padding, .. } = self
        {
            *padding = new_padding;
        }
    }

    /// Operand stack slots the branch needs
    ///
    /// Returns discard the rest of the stack, so only the returned value is counted.
    pub fn stack_pops(&self) -> usize {
        use BranchInstruction::*;

        match self {
            If(_, _, _) | IfNull(_, _, _) | TableSwitch { .. } | LookupSwitch { .. } => 1,
            IReturn | FReturn | AReturn | AThrow => 1,
            IfICmp(_, _, _) | IfACmp(_, _, _) | LReturn | DReturn => 2,
            Goto(_) | GotoW(_) | Jsr(_, _) | JsrW(_, _) | Ret(_) => 0,
            Return | FallThrough(_) | End => 0,
        }
    }

    /// `jsr`, `jsr_w`, and `ret`
    pub fn is_subroutine(&self) -> bool {
        matches!(
            self,
            BranchInstruction::Jsr(_, _) | BranchInstruction::JsrW(_, _) | BranchInstruction::Ret(_)
        )
    }

    /// Opcode, or `None` for the markers that write nothing
    ///
    /// `ret` with a local variable above 255 is additionally prefixed by `wide`.
    pub fn opcode(&self) -> Option<u8> {
        use BranchInstruction::*;

        Some(match self {
            If(comp, _, _) => 0x99 + comp.ordinal(),
            IfICmp(comp, _, _) => 0x9f + comp.ordinal(),
            IfACmp(comp, _, _) => 0xa5 + comp.ordinal(),
            Goto(_) => 0xa7,
            Jsr(_, _) => 0xa8,
            Ret(_) => 0xa9,
            TableSwitch { .. } => 0xaa,
            LookupSwitch { .. } => 0xab,
            IReturn => 0xac,
            LReturn => 0xad,
            FReturn => 0xae,
            DReturn => 0xaf,
            AReturn => 0xb0,
            Return => 0xb1,
            AThrow => 0xbf,
            IfNull(comp, _, _) => 0xc6 + comp.ordinal(),
            GotoW(_) => 0xc8,
            JsrW(_, _) => 0xc9,
            FallThrough(_) | End => return None,
        })
    }
}

impl<Lbl, LblWide, LblFall> Width for BranchInstruction<Lbl, LblWide, LblFall> {
    fn width(&self) -> usize {
        use BranchInstruction::*;

        match self {
            FallThrough(_) | End => 0,
            IReturn | LReturn | FReturn | DReturn | AReturn | Return | AThrow => 1,
            Ret(var) if *var <= 0xff => 2,
            Ret(_) => 4,
            Goto(_) | Jsr(_, _) => 3,
            If(_, _, _) | IfICmp(_, _, _) | IfACmp(_, _, _) | IfNull(_, _, _) => 3,
            GotoW(_) | JsrW(_, _) => 5,

            // opcode, padding, then `default`, `low`, `high`, and one offset per target
            TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),

            // opcode, padding, then `default`, `npairs`, and a key/offset pair per target
            LookupSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * 2 * (1 + targets.len()),
        }
    }
}

impl Serialize for BranchInstruction<i16, i32, ()> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        use BranchInstruction::*;

        let opcode = match self.opcode() {
            Some(opcode) => opcode,
            None => return Ok(()),
        };
        if let Ret(var) = self {
            if let Ok(var) = u8::try_from(*var) {
                opcode.serialize(writer)?;
                return var.serialize(writer);
            }
            WIDE.serialize(writer)?;
            opcode.serialize(writer)?;
            return var.serialize(writer);
        }

        opcode.serialize(writer)?;
        match self {
            If(_, offset, ()) | IfICmp(_, offset, ()) | IfACmp(_, offset, ()) => {
                offset.serialize(writer)
            }
            IfNull(_, offset, ()) | Goto(offset) | Jsr(offset, ()) => offset.serialize(writer),
            GotoW(offset) | JsrW(offset, ()) => offset.serialize(writer),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => {
                writer.write_all(&[0; 3][..*padding as usize])?;
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for offset in targets {
                    offset.serialize(writer)?;
                }
                Ok(())
            }
            LookupSwitch {
                padding,
                default,
                targets,
            } => {
                writer.write_all(&[0; 3][..*padding as usize])?;
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, offset) in targets {
                    key.serialize(writer)?;
                    offset.serialize(writer)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Taken-branch targets of a `BranchInstruction`
pub enum JumpTargets<Lbl, LblWide> {
    None,
    Regular(Lbl),
    Wide(LblWide),
    WideMany(Vec<LblWide>),
}

impl<A> JumpTargets<A, A> {
    pub fn targets(&self) -> &[A] {
        match self {
            JumpTargets::None => &[],
            JumpTargets::Regular(target) | JumpTargets::Wide(target) => {
                std::slice::from_ref(target)
            }
            JumpTargets::WideMany(targets) => targets,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// NaN handling of `fcmp<op>`/`dcmp<op>`
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// NaN compares as -1
    L,

    /// NaN compares as 1
    G,
}

/// Condition of an `int` branch
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl OrdComparison {
    /// Position in the opcode order used by every `if*` family (`eq ne lt ge gt le`)
    const fn ordinal(self) -> u8 {
        match self {
            OrdComparison::EQ => 0,
            OrdComparison::NE => 1,
            OrdComparison::LT => 2,
            OrdComparison::GE => 3,
            OrdComparison::GT => 4,
            OrdComparison::LE => 5,
        }
    }
}

/// Condition of a reference branch
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl EqComparison {
    const fn ordinal(self) -> u8 {
        match self {
            EqComparison::EQ => 0,
            EqComparison::NE => 1,
        }
    }
}

/// Kind of `invoke*` (`invokedynamic` is its own instruction, since its constant is not a
/// method reference)
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,

    /// Argument slot count, including the receiver
    Interface(u8),
}

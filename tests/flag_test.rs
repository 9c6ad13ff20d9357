//! Test EFLAGS reconstruction from raised arithmetic.
//!
//! Every case raises the main computation of one instruction by hand, asks the
//! tracker for a flag and evaluates the derivation with concrete operands.

use bumpalo::Bump;
use mcraise::core::RaiseSession;
use mcraise::ir::interp::Interpreter;
use mcraise::ir::{BinaryOp, BlockId, CastKind, FunnelDir, Function, IntPredicate, Type, ValueId};
use mcraise::mir::{MachineFunction, MirAdaptor};
use mcraise::{EflagBit, TrackerError, TrackerResult, ValueTracker};

const OPS: &str = r#"
ops(i8, i8, i8) {
entry:
    28 c8           ; sub al, cl
    00 c8           ; add al, cl
    38 c8           ; cmp al, cl
    f6 d8           ; neg al
    d0 c0           ; rol al, 1
    d0 c8           ; ror al, 1
    c0 c0 03        ; rol al, 3
    d2 e0           ; shl al, cl
    0f af c1        ; imul eax, ecx
    0f a5 d0        ; shld eax, edx, cl
    0f ad d0        ; shrd eax, edx, cl
    f6 e1           ; mul cl
    c3              ; ret
}
"#;

const SUB: usize = 0;
const ADD: usize = 1;
const CMP: usize = 2;
const NEG: usize = 3;
const ROL1: usize = 4;
const ROR1: usize = 5;
const ROL3: usize = 6;
const SHL: usize = 7;
const IMUL: usize = 8;
const SHLD: usize = 9;
const SHRD: usize = 10;
const MUL: usize = 11;

/// Raise the computation with `build`, derive `flag` from it as instruction
/// `inst` and evaluate the flag with `args`.
fn derive<F>(inst: usize, flag: EflagBit, args: &[u64], carry_in: Option<bool>, build: F) -> TrackerResult<u64>
where
    F: FnOnce(&mut Function, &[ValueId]) -> ValueId,
{
    let machines = MachineFunction::parse(OPS).unwrap();
    let machine = &machines[0];
    let adaptor = MirAdaptor::new(machine);
    let arena = Bump::new();
    let session = RaiseSession::new(&arena);
    let mut func = machine.raised_function();
    let mut tracker = ValueTracker::new(&session, &adaptor, &func)?;

    if let Some(carry) = carry_in {
        tracker.set_flag_value(&mut func, EflagBit::CF, BlockId::ENTRY, carry)?;
    }
    let operands = func.args().to_vec();
    let test = build(&mut func, &operands);
    let inst = adaptor.inst_at(BlockId::ENTRY, inst).unwrap();
    tracker.set_flag_from_test(&mut func, flag, inst, test)?;

    let value = tracker.read_flag(&mut func, flag, BlockId::ENTRY)?.unwrap();
    assert_eq!(func.ty(value), Type::I1);
    Ok(Interpreter::new(&func).with_args(args).eval(value).unwrap())
}

fn sub(func: &mut Function, args: &[ValueId]) -> ValueId {
    func.binary(BlockId::ENTRY, BinaryOp::Sub, args[0], args[1])
}

fn add(func: &mut Function, args: &[ValueId]) -> ValueId {
    func.binary(BlockId::ENTRY, BinaryOp::Add, args[0], args[1])
}

fn flags_of(inst: usize, args: &[u64], build: fn(&mut Function, &[ValueId]) -> ValueId) -> [u64; 4] {
    [EflagBit::ZF, EflagBit::SF, EflagBit::CF, EflagBit::OF]
        .map(|flag| derive(inst, flag, args, None, build).unwrap())
}

#[test]
fn test_subtract_flags() {
    assert_eq!(flags_of(SUB, &[5, 5], sub), [1, 0, 0, 0]);
    assert_eq!(flags_of(SUB, &[0, 1], sub), [0, 1, 1, 0]);
    assert_eq!(flags_of(SUB, &[0x80, 1], sub), [0, 0, 0, 1]);
    assert_eq!(flags_of(SUB, &[0x7f, 0xff], sub), [0, 1, 1, 1]);
}

#[test]
fn test_compare_flags() {
    assert_eq!(flags_of(CMP, &[3, 5], sub), [0, 1, 1, 0]);
    assert_eq!(flags_of(CMP, &[9, 9], sub), [1, 0, 0, 0]);
}

#[test]
fn test_add_flags() {
    assert_eq!(flags_of(ADD, &[0xff, 1], add), [1, 0, 1, 0]);
    assert_eq!(flags_of(ADD, &[0x7f, 1], add), [0, 1, 0, 1]);
    assert_eq!(flags_of(ADD, &[0x80, 0x80], add), [1, 0, 1, 1]);
}

#[test]
fn test_negate_carry() {
    let neg = |func: &mut Function, args: &[ValueId]| {
        let zero = func.const_int(Type::I8, 0);
        func.binary(BlockId::ENTRY, BinaryOp::Sub, zero, args[0])
    };
    assert_eq!(derive(NEG, EflagBit::CF, &[0], None, neg).unwrap(), 0);
    assert_eq!(derive(NEG, EflagBit::CF, &[5], None, neg).unwrap(), 1);
    assert_eq!(derive(NEG, EflagBit::ZF, &[0], None, neg).unwrap(), 1);
}

#[test]
fn test_widened_result_is_looked_through() {
    let widened = |func: &mut Function, args: &[ValueId]| {
        let diff = func.binary(BlockId::ENTRY, BinaryOp::Sub, args[0], args[1]);
        func.cast(BlockId::ENTRY, CastKind::ZExt, diff, Type::I32)
    };
    assert_eq!(derive(SUB, EflagBit::OF, &[0x80, 1], None, widened).unwrap(), 1);
    assert_eq!(derive(SUB, EflagBit::CF, &[0, 1], None, widened).unwrap(), 1);
    // Sign is taken from the value as given.
    assert_eq!(derive(SUB, EflagBit::SF, &[0, 1], None, widened).unwrap(), 0);
    assert_eq!(derive(SUB, EflagBit::ZF, &[4, 4], None, widened).unwrap(), 1);
}

#[test]
fn test_rotate_by_one() {
    let rol = |func: &mut Function, args: &[ValueId]| {
        let one = func.const_int(Type::I8, 1);
        func.funnel_shift(BlockId::ENTRY, FunnelDir::Left, args[0], args[0], one)
    };
    // 0x81 -> 0x03
    assert_eq!(derive(ROL1, EflagBit::CF, &[0x81], None, rol).unwrap(), 1);
    assert_eq!(derive(ROL1, EflagBit::OF, &[0x81], None, rol).unwrap(), 1);
    // 0xc0 -> 0x81
    assert_eq!(derive(ROL1, EflagBit::OF, &[0xc0], None, rol).unwrap(), 0);
    // 0x40 -> 0x80
    assert_eq!(derive(ROL1, EflagBit::CF, &[0x40], None, rol).unwrap(), 0);
    assert_eq!(derive(ROL1, EflagBit::OF, &[0x40], None, rol).unwrap(), 1);

    let ror = |func: &mut Function, args: &[ValueId]| {
        let one = func.const_int(Type::I8, 1);
        func.funnel_shift(BlockId::ENTRY, FunnelDir::Right, args[0], args[0], one)
    };
    // 0x01 -> 0x80
    assert_eq!(derive(ROR1, EflagBit::CF, &[0x01], None, ror).unwrap(), 1);
    assert_eq!(derive(ROR1, EflagBit::OF, &[0x01], None, ror).unwrap(), 1);
    // 0x02 -> 0x01
    assert_eq!(derive(ROR1, EflagBit::CF, &[0x02], None, ror).unwrap(), 0);
    assert_eq!(derive(ROR1, EflagBit::OF, &[0x02], None, ror).unwrap(), 0);
    // 0x83 -> 0xc1
    assert_eq!(derive(ROR1, EflagBit::OF, &[0x83], None, ror).unwrap(), 0);
}

#[test]
fn test_rotate_overflow_needs_count_one() {
    let rol = |func: &mut Function, args: &[ValueId]| {
        let three = func.const_int(Type::I8, 3);
        func.funnel_shift(BlockId::ENTRY, FunnelDir::Left, args[0], args[0], three)
    };
    let err = derive(ROL3, EflagBit::OF, &[0x20], None, rol).unwrap_err();
    assert!(matches!(
        err,
        TrackerError::UnsupportedFlagSemantics { flag: EflagBit::OF, ref family, .. } if family == "rol"
    ));
    // 0x20 -> 0x01
    assert_eq!(derive(ROL3, EflagBit::CF, &[0x20], None, rol).unwrap(), 1);
}

#[test]
fn test_shift_left_variable_count() {
    let shl = |func: &mut Function, args: &[ValueId]| func.binary(BlockId::ENTRY, BinaryOp::Shl, args[0], args[1]);

    assert_eq!(derive(SHL, EflagBit::CF, &[0x40, 1], Some(true), shl).unwrap(), 0);
    assert_eq!(derive(SHL, EflagBit::CF, &[0x40, 2], Some(false), shl).unwrap(), 1);
    // A zero count leaves the carry alone.
    assert_eq!(derive(SHL, EflagBit::CF, &[0x40, 0], Some(true), shl).unwrap(), 1);
    assert_eq!(derive(SHL, EflagBit::CF, &[0xff, 0], Some(false), shl).unwrap(), 0);

    let err = derive(SHL, EflagBit::CF, &[0x40, 1], None, shl).unwrap_err();
    assert!(matches!(err, TrackerError::UnsupportedFlagSemantics { flag: EflagBit::CF, .. }));
}

#[test]
fn test_shift_left_constant_count() {
    let by_one = |func: &mut Function, args: &[ValueId]| {
        let one = func.const_int(Type::I8, 1);
        func.binary(BlockId::ENTRY, BinaryOp::Shl, args[0], one)
    };
    assert_eq!(derive(SHL, EflagBit::CF, &[0x80], None, by_one).unwrap(), 1);
    assert_eq!(derive(SHL, EflagBit::CF, &[0x7f], None, by_one).unwrap(), 0);

    let by_zero = |func: &mut Function, args: &[ValueId]| {
        let zero = func.const_int(Type::I8, 0);
        func.binary(BlockId::ENTRY, BinaryOp::Shl, args[0], zero)
    };
    assert_eq!(derive(SHL, EflagBit::CF, &[0x80], Some(false), by_zero).unwrap(), 0);
    assert!(derive(SHL, EflagBit::CF, &[0x80], None, by_zero).is_err());
}

#[test]
fn test_double_shifts() {
    let shld = |func: &mut Function, args: &[ValueId]| {
        let two = func.const_int(Type::I8, 2);
        func.funnel_shift(BlockId::ENTRY, FunnelDir::Left, args[0], args[1], two)
    };
    assert_eq!(derive(SHLD, EflagBit::CF, &[0x40, 0], None, shld).unwrap(), 1);
    assert_eq!(derive(SHLD, EflagBit::CF, &[0x80, 0xff], None, shld).unwrap(), 0);

    let shrd = |func: &mut Function, args: &[ValueId]| {
        let two = func.const_int(Type::I8, 2);
        func.funnel_shift(BlockId::ENTRY, FunnelDir::Right, args[1], args[0], two)
    };
    assert_eq!(derive(SHRD, EflagBit::CF, &[0x02, 0], None, shrd).unwrap(), 1);
    assert_eq!(derive(SHRD, EflagBit::CF, &[0x01, 0xff], None, shrd).unwrap(), 0);

    // A left funnel does not answer for shrd.
    let err = derive(SHRD, EflagBit::CF, &[0, 0], None, shld).unwrap_err();
    assert!(matches!(err, TrackerError::FlagProducerMismatch { flag: EflagBit::CF, .. }));
}

#[test]
fn test_signed_multiply_sets_both() {
    let machines = MachineFunction::parse(OPS).unwrap();
    let adaptor = MirAdaptor::new(&machines[0]);
    let arena = Bump::new();
    let session = RaiseSession::new(&arena);
    let mut func = machines[0].raised_function();
    let mut tracker = ValueTracker::new(&session, &adaptor, &func).unwrap();
    let (a, b) = (func.arg(0).unwrap(), func.arg(1).unwrap());

    let product = func.binary(BlockId::ENTRY, BinaryOp::Mul, a, b);
    let inst = adaptor.inst_at(BlockId::ENTRY, IMUL).unwrap();
    tracker.set_flag_from_test(&mut func, EflagBit::OF, inst, product).unwrap();

    let of = tracker.read_flag(&mut func, EflagBit::OF, BlockId::ENTRY).unwrap().unwrap();
    let cf = tracker.read_flag(&mut func, EflagBit::CF, BlockId::ENTRY).unwrap().unwrap();
    assert_eq!(of, cf);
    assert_eq!(session.stats().flag_families.get("imul"), Some(&1));

    assert_eq!(Interpreter::new(&func).with_args(&[0x40, 2]).eval(cf).unwrap(), 1);
    assert_eq!(Interpreter::new(&func).with_args(&[0x20, 2]).eval(cf).unwrap(), 0);
    assert_eq!(Interpreter::new(&func).with_args(&[0xff, 0xff]).eval(of).unwrap(), 0);
}

#[test]
fn test_signed_multiply_sign_keeps_overflow() {
    let machines = MachineFunction::parse(OPS).unwrap();
    let adaptor = MirAdaptor::new(&machines[0]);
    let arena = Bump::new();
    let session = RaiseSession::new(&arena);
    let mut func = machines[0].raised_function();
    let mut tracker = ValueTracker::new(&session, &adaptor, &func).unwrap();
    let (a, b) = (func.arg(0).unwrap(), func.arg(1).unwrap());

    let product = func.binary(BlockId::ENTRY, BinaryOp::Mul, a, b);
    let inst = adaptor.inst_at(BlockId::ENTRY, IMUL).unwrap();
    tracker.set_flag_from_test(&mut func, EflagBit::OF, inst, product).unwrap();
    tracker.set_flag_from_test(&mut func, EflagBit::SF, inst, product).unwrap();
    tracker.set_flag_from_test(&mut func, EflagBit::ZF, inst, product).unwrap();

    let of = tracker.read_flag(&mut func, EflagBit::OF, BlockId::ENTRY).unwrap().unwrap();
    let cf = tracker.read_flag(&mut func, EflagBit::CF, BlockId::ENTRY).unwrap().unwrap();
    let sf = tracker.read_flag(&mut func, EflagBit::SF, BlockId::ENTRY).unwrap().unwrap();
    assert_eq!(of, cf);
    assert_ne!(of, sf);

    // 0x90 * 1 fits in i8 but has the sign bit set.
    let mut interp = Interpreter::new(&func).with_args(&[0x90, 1]);
    assert_eq!(interp.eval(of).unwrap(), 0);
    assert_eq!(interp.eval(cf).unwrap(), 0);
    assert_eq!(interp.eval(sf).unwrap(), 1);
}

#[test]
fn test_widened_rotate_is_looked_through() {
    let ror = |func: &mut Function, args: &[ValueId]| {
        let one = func.const_int(Type::I8, 1);
        let rotated = func.funnel_shift(BlockId::ENTRY, FunnelDir::Right, args[0], args[0], one);
        func.cast(BlockId::ENTRY, CastKind::ZExt, rotated, Type::I32)
    };
    // 0x01 -> 0x80
    assert_eq!(derive(ROR1, EflagBit::CF, &[0x01], None, ror).unwrap(), 1);
    assert_eq!(derive(ROR1, EflagBit::OF, &[0x01], None, ror).unwrap(), 1);
    // 0x83 -> 0xc1
    assert_eq!(derive(ROR1, EflagBit::OF, &[0x83], None, ror).unwrap(), 0);

    let rol = |func: &mut Function, args: &[ValueId]| {
        let one = func.const_int(Type::I8, 1);
        let rotated = func.funnel_shift(BlockId::ENTRY, FunnelDir::Left, args[0], args[0], one);
        func.cast(BlockId::ENTRY, CastKind::ZExt, rotated, Type::I64)
    };
    // 0x40 -> 0x80
    assert_eq!(derive(ROL1, EflagBit::CF, &[0x40], None, rol).unwrap(), 0);
    assert_eq!(derive(ROL1, EflagBit::OF, &[0x40], None, rol).unwrap(), 1);
    // 0xc0 -> 0x81
    assert_eq!(derive(ROL1, EflagBit::OF, &[0xc0], None, rol).unwrap(), 0);
}

#[test]
fn test_negate_requires_zero_minuend() {
    let err = derive(NEG, EflagBit::CF, &[1, 2], None, sub).unwrap_err();
    assert_eq!(
        err,
        TrackerError::FlagProducerMismatch {
            flag: EflagBit::CF,
            family: "neg".to_string(),
            expected: "a subtract from zero",
        }
    );
}

#[test]
fn test_unsupported_flags() {
    let err = derive(MUL, EflagBit::CF, &[1, 1], None, |func, args| {
        func.binary(BlockId::ENTRY, BinaryOp::Mul, args[0], args[1])
    })
    .unwrap_err();
    assert!(matches!(err, TrackerError::UnsupportedFlagSemantics { flag: EflagBit::CF, .. }));

    let err = derive(SUB, EflagBit::PF, &[1, 1], None, sub).unwrap_err();
    assert_eq!(err, TrackerError::UnsupportedFlagBit { flag: EflagBit::PF });
    let err = derive(SUB, EflagBit::AF, &[1, 1], None, sub).unwrap_err();
    assert_eq!(err, TrackerError::UnsupportedFlagBit { flag: EflagBit::AF });
}

#[test]
fn test_producer_mismatch() {
    let err = derive(SUB, EflagBit::OF, &[1, 1], None, add).unwrap_err();
    assert_eq!(
        err,
        TrackerError::FlagProducerMismatch {
            flag: EflagBit::OF,
            family: "sub".to_string(),
            expected: "a subtract",
        }
    );
    let err = derive(SHL, EflagBit::CF, &[1, 1], None, sub).unwrap_err();
    assert!(matches!(err, TrackerError::FlagProducerMismatch { .. }));
}

#[test]
fn test_flag_merge_across_diamond() {
    let machines = MachineFunction::parse(include_str!("fixtures/diamond.mir")).unwrap();
    let machine = &machines[0];
    let adaptor = MirAdaptor::new(machine);
    let arena = Bump::new();
    let session = RaiseSession::new(&arena);
    let mut func = machine.raised_function();
    let mut tracker = ValueTracker::new(&session, &adaptor, &func).unwrap();
    let [entry, left, right, join] = [0, 1, 2, 3].map(BlockId);

    let (a, b) = (func.arg(0).unwrap(), func.arg(1).unwrap());
    let cond = func.icmp(entry, IntPredicate::Ugt, a, b);
    func.cond_br(entry, cond, left, right);
    tracker.set_flag_value(&mut func, EflagBit::ZF, left, true).unwrap();
    func.br(left, join);
    tracker.set_flag_value(&mut func, EflagBit::ZF, right, false).unwrap();
    func.br(right, join);

    let zf = tracker.read_flag(&mut func, EflagBit::ZF, join).unwrap().unwrap();
    assert_eq!(func.ty(zf), Type::I1);
    let merge = tracker.merges()[0];
    assert_eq!(func.slot(merge.slot).ty, Type::I1);
    assert_eq!(func.slot(merge.slot).name, "zf-merge");
    assert_eq!(tracker.read_flag(&mut func, EflagBit::CF, join).unwrap(), None);

    func.ret(join, Some(zf));
    tracker.finish(&mut func).unwrap();
    assert_eq!(Interpreter::new(&func).with_args(&[5, 3]).run().unwrap(), Some(1));
    assert_eq!(Interpreter::new(&func).with_args(&[3, 5]).run().unwrap(), Some(0));
}

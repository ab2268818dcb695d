use super::*;
use crate::ir::builder::FuncBuilder;
use crate::types::Scalar;

#[test]
fn test_arithmetic_and_output() {
    let reg = TypeRegistry::new();
    let mut b = FuncBuilder::new("math");
    let a = b.const_int(Scalar::I32, 40);
    let c = b.const_int(Scalar::I32, 2);
    let s = b.binop(BinOp::Add, a, c);
    b.output(s);
    let f = b.finish();

    let mut m = Machine::new(&reg);
    assert_eq!(m.run(&f, 0).unwrap(), vec![Val::Int(42)]);
}

#[test]
fn test_align_and_offset() {
    let reg = TypeRegistry::new();
    let mut f = FuncBuilder::new("addr").finish();
    let sp = f.stack_ptr;
    f.body = vec![
        Instr::AlignUp {
            dest: ValueId(1),
            value: sp,
            align: 16,
        },
        Instr::OffsetAdd {
            dest: ValueId(2),
            base: ValueId(1),
            amount: 28,
        },
        Instr::Output { value: ValueId(2) },
    ];
    f.next_value = 3;

    let mut m = Machine::new(&reg);
    assert_eq!(m.run(&f, 9).unwrap(), vec![Val::Int(44)]);
}

#[test]
fn test_store_load_roundtrip_vector() {
    let reg = TypeRegistry::new();
    let elem = Elem {
        scalar: Scalar::F32,
        lanes: 3,
    };
    let mut m = Machine::new(&reg);
    m.store_elem(
        16,
        elem,
        &Val::Vector(vec![Val::Float(1.0), Val::Float(2.0), Val::Float(3.0)]),
    )
    .unwrap();
    assert_eq!(
        m.load_elem(16, elem).unwrap(),
        Val::Vector(vec![Val::Float(1.0), Val::Float(2.0), Val::Float(3.0)])
    );
}

#[test]
fn test_narrow_int_sign_extends() {
    let reg = TypeRegistry::new();
    let elem = Elem {
        scalar: Scalar::I8,
        lanes: 1,
    };
    let mut m = Machine::new(&reg);
    m.store_elem(0, elem, &Val::Int(-5)).unwrap();
    assert_eq!(m.load_elem(0, elem).unwrap(), Val::Int(-5));
}

#[test]
fn test_select_reads_only_taken_operand() {
    let reg = TypeRegistry::new();
    let mut f = FuncBuilder::new("sel").finish();
    f.body = vec![
        Instr::ConstInt {
            dest: ValueId(1),
            value: 1,
            scalar: Scalar::Bool,
        },
        Instr::ConstInt {
            dest: ValueId(2),
            value: 7,
            scalar: Scalar::I32,
        },
        // ValueId(9) is never defined; the false arm must not be read.
        Instr::Select {
            dest: ValueId(3),
            cond: ValueId(1),
            on_true: ValueId(2),
            on_false: ValueId(9),
        },
        Instr::Output { value: ValueId(3) },
    ];
    f.next_value = 4;

    let mut m = Machine::new(&reg);
    assert_eq!(m.run(&f, 0).unwrap(), vec![Val::Int(7)]);
}

#[test]
fn test_loop_repeats_body() {
    let reg = TypeRegistry::new();
    let mut b = FuncBuilder::new("rep");
    let v = b.const_int(Scalar::I32, 3);
    b.loop_(4, |b| {
        b.output(v);
    });
    let f = b.finish();

    let mut m = Machine::new(&reg);
    assert_eq!(m.run(&f, 0).unwrap(), vec![Val::Int(3); 4]);
}

#[test]
fn test_abstract_op_is_rejected() {
    let mut reg = TypeRegistry::new();
    let i32t = reg.scalar(Scalar::I32);
    let mut b = FuncBuilder::new("raw");
    b.alloc(i32t);
    let f = b.finish();

    let mut m = Machine::new(&reg);
    assert!(matches!(m.run(&f, 0), Err(EvalError::Unlowered(_))));
}

#[test]
fn test_out_of_bounds_store_fails() {
    let reg = TypeRegistry::new();
    let elem = Elem {
        scalar: Scalar::I32,
        lanes: 1,
    };
    let mut m = Machine::new(&reg);
    let err = m.store_elem(-4, elem, &Val::Int(1)).unwrap_err();
    assert!(matches!(err, EvalError::OutOfBounds { .. }));
}

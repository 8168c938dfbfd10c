//! End-to-end semantic checks.
//!
//! Every rewrite must preserve the value of the program it rewrites. The
//! reference evaluator here interprets the IR, including every emitted
//! `halide.hexagon.*` instruction (interleave and deinterleave as the
//! even/odd lane permutations, widening instructions producing their
//! results in deinterleaved order), and each scenario is evaluated before
//! and after optimization on seeded random inputs.

use hexagon_opt::intrinsics::{bitwise_not, clz};
use hexagon_opt::ir::expr::*;
use hexagon_opt::ir::{Expr, Mutator, Stmt, Type, TypeCode};
use hexagon_opt::{optimize_hexagon_instructions, optimize_hexagon_shuffles};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------
// Reference evaluator.

type Lanes = Vec<i64>;

#[derive(Default, Clone)]
struct Env {
    vars: HashMap<String, Lanes>,
    buffers: HashMap<String, Lanes>,
}

fn wrap(ty: Type, v: i64) -> i64 {
    assert!(ty.is_integer());
    if ty.bits >= 64 {
        return v;
    }
    let mask = (1i64 << ty.bits) - 1;
    let w = v & mask;
    if ty.code == TypeCode::Int && (w >> (ty.bits - 1)) & 1 == 1 {
        w - (1i64 << ty.bits)
    } else {
        w
    }
}

fn saturate(ty: Type, v: i64) -> i64 {
    v.clamp(ty.min_value(), ty.max_value())
}

fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn mod_floor(a: i64, b: i64) -> i64 {
    a - div_floor(a, b) * b
}

fn leading_zeros(bits: u8, v: i64) -> i64 {
    let mask = if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    };
    let masked = (v as u64) & mask;
    i64::from(masked.leading_zeros()) - i64::from(64 - u32::from(bits))
}

/// Natural order to paired even/odd order.
fn interleave_lanes(v: &[i64]) -> Lanes {
    assert!(v.len() % 2 == 0);
    let half = v.len() / 2;
    (0..v.len())
        .map(|i| if i % 2 == 0 { v[i / 2] } else { v[half + i / 2] })
        .collect()
}

/// Paired even/odd order back to natural order.
fn deinterleave_lanes(v: &[i64]) -> Lanes {
    assert!(v.len() % 2 == 0);
    let half = v.len() / 2;
    let mut out = vec![0; v.len()];
    for i in 0..half {
        out[i] = v[2 * i];
        out[half + i] = v[2 * i + 1];
    }
    out
}

/// Lane `i` of a value that may be scalar.
fn ln(v: &[i64], i: usize) -> i64 {
    if v.len() == 1 {
        v[0]
    } else {
        v[i]
    }
}

fn eval_call(ty: Type, name: &str, args: &[Lanes], lanes: usize) -> Lanes {
    let elem = ty.element_of();
    let a0 = &args[0];
    let map1 = |f: &dyn Fn(i64) -> i64| (0..lanes).map(|i| f(ln(a0, i))).collect::<Lanes>();
    let map2 = |f: &dyn Fn(i64, i64) -> i64| {
        (0..lanes)
            .map(|i| f(ln(a0, i), ln(&args[1], i)))
            .collect::<Lanes>()
    };
    let map3 = |f: &dyn Fn(i64, i64, i64) -> i64| {
        (0..lanes)
            .map(|i| f(ln(a0, i), ln(&args[1], i), ln(&args[2], i)))
            .collect::<Lanes>()
    };

    let n = name.strip_prefix("halide.hexagon.").unwrap_or(name);
    match n {
        _ if n.starts_with("interleave.") => interleave_lanes(a0),
        _ if n.starts_with("deinterleave.") => deinterleave_lanes(a0),
        _ if n.starts_with("avg_rnd.") => map2(&|x, y| div_floor(x + y + 1, 2)),
        _ if n.starts_with("avg.") => map2(&|x, y| div_floor(x + y, 2)),
        _ if n.starts_with("navg.") => map2(&|x, y| saturate(elem, div_floor(x - y, 2))),
        "satw_add_mpy.vw.vh.h" => {
            let acc = interleave_lanes(a0);
            let summed: Lanes = (0..lanes)
                .map(|i| saturate(elem, acc[i] + ln(&args[1], i) * ln(&args[2], i)))
                .collect();
            deinterleave_lanes(&summed)
        }
        _ if n.starts_with("satub_add.")
            || n.starts_with("satuh_add.")
            || n.starts_with("sath_add.")
            || n.starts_with("satw_add.") =>
        {
            map2(&|x, y| saturate(elem, x + y))
        }
        _ if n.starts_with("satub_sub.") || n.starts_with("sath_sub.") => {
            map2(&|x, y| saturate(elem, x - y))
        }
        "trunc_satub_rnd.vh" => {
            let x = interleave_lanes(a0);
            (0..lanes)
                .map(|i| saturate(elem, div_floor(x[i] + 128, 256)))
                .collect()
        }
        "trunc_sath_rnd.vw" | "trunc_satuh_rnd.vw" => {
            let x = interleave_lanes(a0);
            (0..lanes)
                .map(|i| saturate(elem, div_floor(x[i] + 32768, 65536)))
                .collect()
        }
        _ if n.starts_with("trunc_satub_shr.")
            || n.starts_with("trunc_sath_shr.")
            || n.starts_with("trunc_satuh_shr.") =>
        {
            let x = interleave_lanes(a0);
            let shift = args[1][0];
            (0..lanes)
                .map(|i| saturate(elem, div_floor(x[i], 1 << shift)))
                .collect()
        }
        "trunclo.vh" | "trunclo.vw" => {
            let x = interleave_lanes(a0);
            let divisor = if n.ends_with("vh") { 256 } else { 65536 };
            (0..lanes)
                .map(|i| wrap(elem, div_floor(x[i], divisor)))
                .collect()
        }
        _ if n.starts_with("trunc_satub.")
            || n.starts_with("trunc_satb.")
            || n.starts_with("trunc_sath.")
            || n.starts_with("trunc_satuh.") =>
        {
            let x = interleave_lanes(a0);
            (0..lanes).map(|i| saturate(elem, x[i])).collect()
        }
        _ if n.starts_with("trunc.") => {
            let x = interleave_lanes(a0);
            (0..lanes).map(|i| wrap(elem, x[i])).collect()
        }
        _ if n.starts_with("pack_sat") => map1(&|x| saturate(elem, x)),
        _ if n.starts_with("pack.") => map1(&|x| wrap(elem, x)),
        _ if n.starts_with("zxt.") || n.starts_with("sxt.") => {
            deinterleave_lanes(&map1(&|x| wrap(elem, x)))
        }
        _ if n.starts_with("mpy.") => deinterleave_lanes(&map2(&|x, y| wrap(elem, x * y))),
        _ if n.starts_with("add_vuh.") || n.starts_with("add_vuw.") || n.starts_with("add_vw.") => {
            deinterleave_lanes(&map2(&|x, y| wrap(elem, x + y)))
        }
        _ if n.starts_with("add_mpy.") => {
            let acc = interleave_lanes(a0);
            let summed: Lanes = (0..lanes)
                .map(|i| wrap(elem, acc[i] + ln(&args[1], i) * ln(&args[2], i)))
                .collect();
            deinterleave_lanes(&summed)
        }
        _ if n.starts_with("add_shl.") => map3(&|acc, x, s| wrap(elem, acc + (x << s))),
        _ if n.starts_with("add_shr.") => map3(&|acc, x, s| wrap(elem, acc + div_floor(x, 1 << s))),
        _ if n.starts_with("add_mul.") => map3(&|acc, x, y| wrap(elem, acc + x * y)),
        _ if n.starts_with("shl.") => map2(&|x, s| wrap(elem, x << s)),
        _ if n.starts_with("cls.") => {
            map1(&|x| leading_zeros(ty.bits, x).max(leading_zeros(ty.bits, !x)) - 1)
        }
        "clz" => map1(&|x| leading_zeros(ty.bits, x)),
        "bitwise_not" => map1(&|x| wrap(elem, !x)),
        "bitwise_and" => map2(&|x, y| wrap(elem, x & y)),
        "bitwise_or" => map2(&|x, y| wrap(elem, x | y)),
        "bitwise_xor" => map2(&|x, y| wrap(elem, x ^ y)),
        "shift_left" => map2(&|x, s| wrap(elem, x << s)),
        "shift_right" => map2(&|x, s| wrap(elem, div_floor(x, 1 << s))),
        "abs" => map1(&|x| wrap(elem, x.abs())),
        "absd" => map2(&|x, y| (x - y).abs()),
        "dynamic_shuffle" => {
            let lut = a0;
            (0..lanes).map(|i| lut[ln(&args[1], i) as usize]).collect()
        }
        _ => panic!("evaluator does not know intrinsic {}", name),
    }
}

fn eval(e: &Expr, env: &Env) -> Lanes {
    let ty = e.ty();
    let lanes = ty.lanes as usize;
    let bin = |a: &Expr, b: &Expr, f: &dyn Fn(i64, i64) -> i64| -> Lanes {
        let (va, vb) = (eval(a, env), eval(b, env));
        (0..lanes).map(|i| f(ln(&va, i), ln(&vb, i))).collect()
    };
    match e {
        Expr::IntImm { value, .. } => vec![*value],
        Expr::UIntImm { value, .. } => vec![*value as i64],
        Expr::Variable { name, .. } => env
            .vars
            .get(name)
            .unwrap_or_else(|| panic!("unbound variable {}", name))
            .clone(),
        Expr::Cast { ty, value } => eval(value, env)
            .iter()
            .map(|v| wrap(ty.element_of(), *v))
            .collect(),
        Expr::Broadcast { value, lanes } => {
            let v = eval(value, env);
            vec![ln(&v, 0); *lanes as usize]
        }
        Expr::Ramp {
            base,
            stride,
            lanes,
        } => {
            let (b, s) = (eval(base, env), eval(stride, env));
            (0..*lanes as i64)
                .map(|i| wrap(base.ty().element_of(), ln(&b, 0) + i * ln(&s, 0)))
                .collect()
        }
        Expr::Add { a, b } => bin(a, b, &|x, y| wrap(ty.element_of(), x + y)),
        Expr::Sub { a, b } => bin(a, b, &|x, y| wrap(ty.element_of(), x - y)),
        Expr::Mul { a, b } => bin(a, b, &|x, y| wrap(ty.element_of(), x * y)),
        Expr::Div { a, b } => bin(a, b, &|x, y| wrap(ty.element_of(), div_floor(x, y))),
        Expr::Mod { a, b } => bin(a, b, &|x, y| wrap(ty.element_of(), mod_floor(x, y))),
        Expr::Min { a, b } => bin(a, b, &|x, y| x.min(y)),
        Expr::Max { a, b } => bin(a, b, &|x, y| x.max(y)),
        Expr::Eq { a, b } => bin(a, b, &|x, y| (x == y) as i64),
        Expr::Ne { a, b } => bin(a, b, &|x, y| (x != y) as i64),
        Expr::Lt { a, b } => bin(a, b, &|x, y| (x < y) as i64),
        Expr::Le { a, b } => bin(a, b, &|x, y| (x <= y) as i64),
        Expr::Gt { a, b } => bin(a, b, &|x, y| (x > y) as i64),
        Expr::Ge { a, b } => bin(a, b, &|x, y| (x >= y) as i64),
        Expr::And { a, b } => bin(a, b, &|x, y| ((x != 0) && (y != 0)) as i64),
        Expr::Or { a, b } => bin(a, b, &|x, y| ((x != 0) || (y != 0)) as i64),
        Expr::Not { a } => eval(a, env).iter().map(|v| (*v == 0) as i64).collect(),
        Expr::Select { cond, t, f } => {
            let (vc, vt, vf) = (eval(cond, env), eval(t, env), eval(f, env));
            (0..lanes)
                .map(|i| {
                    if ln(&vc, i) != 0 {
                        ln(&vt, i)
                    } else {
                        ln(&vf, i)
                    }
                })
                .collect()
        }
        Expr::Load { ty, name, index, .. } => {
            let buffer = env
                .buffers
                .get(name)
                .unwrap_or_else(|| panic!("unbound buffer {}", name));
            eval(index, env)
                .iter()
                .map(|i| wrap(ty.element_of(), buffer[*i as usize]))
                .collect()
        }
        Expr::Call {
            ty, name, args, ..
        } => {
            let values: Vec<Lanes> = args.iter().map(|a| eval(a, env)).collect();
            eval_call(*ty, name, &values, lanes)
        }
        Expr::Let { name, value, body } => {
            let mut inner = env.clone();
            inner.vars.insert(name.clone(), eval(value, env));
            eval(body, &inner)
        }
    }
}

// ---------------------------------------------------------------------
// Harness.

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn collect_vars(e: &Expr, out: &mut BTreeMap<String, Type>) {
    struct Collect<'a>(&'a mut BTreeMap<String, Type>);
    impl Mutator for Collect<'_> {
        fn mutate_expr(&mut self, e: &Expr) -> Expr {
            if let Expr::Variable { ty, name } = e {
                self.0.insert(name.clone(), *ty);
            }
            self.walk_expr(e)
        }
    }
    Collect(out).mutate_expr(e);
}

fn random_env(vars: &BTreeMap<String, Type>, rng: &mut StdRng) -> Env {
    let mut env = Env::default();
    for (name, ty) in vars {
        let elem = ty.element_of();
        let values = (0..ty.lanes)
            .map(|_| rng.gen_range(elem.min_value()..=elem.max_value()))
            .collect();
        env.vars.insert(name.clone(), values);
    }
    env
}

fn optimize_expr(e: &Expr) -> Expr {
    match optimize_hexagon_instructions(&Stmt::Evaluate { value: e.clone() }) {
        Stmt::Evaluate { value } => value,
        _ => unreachable!(),
    }
}

/// No `deinterleave(interleave(x))` or `interleave(deinterleave(x))` may
/// survive optimization.
fn assert_no_adjacent_permutation_pairs(e: &Expr) {
    struct Check;
    impl Mutator for Check {
        fn mutate_expr(&mut self, e: &Expr) -> Expr {
            if let Expr::Call { name, args, .. } = e {
                let outer_int = name.starts_with("halide.hexagon.interleave");
                let outer_deint = name.starts_with("halide.hexagon.deinterleave");
                if outer_int || outer_deint {
                    if let Expr::Call { name: inner, .. } = &args[0] {
                        let inner_int = inner.starts_with("halide.hexagon.interleave");
                        let inner_deint = inner.starts_with("halide.hexagon.deinterleave");
                        assert!(
                            !(outer_int && inner_deint) && !(outer_deint && inner_int),
                            "adjacent permutation pair survived: {}",
                            e
                        );
                    }
                }
            }
            self.walk_expr(e)
        }
    }
    Check.mutate_expr(e);
}

fn assert_equivalent(source: &Expr) {
    init_logging();
    let optimized = optimize_expr(source);
    assert_no_adjacent_permutation_pairs(&optimized);
    // Idempotence, structurally.
    assert_eq!(optimize_expr(&optimized), optimized, "pass is not idempotent");

    let mut vars = BTreeMap::new();
    collect_vars(source, &mut vars);
    let mut rng = StdRng::seed_from_u64(0x4845_5841);
    for round in 0..16 {
        let env = random_env(&vars, &mut rng);
        let before = eval(source, &env);
        let after = eval(&optimized, &env);
        assert_eq!(
            before, after,
            "round {}: {} and {} disagree",
            round, source, optimized
        );
    }
}

fn assert_rewritten(source: &Expr) {
    let optimized = optimize_expr(source);
    assert_ne!(&optimized, source, "expected a rewrite of {}", source);
    assert_equivalent(source);
}

// ---------------------------------------------------------------------
// Scenarios.

fn u8v(name: &str) -> Expr {
    var(Type::uint(8, 64), name)
}

#[test]
fn averaging() {
    let t16 = Type::uint(16, 64);
    let widened = add(cast(t16, u8v("a")), cast(t16, u8v("b")));
    assert_rewritten(&cast(
        Type::uint(8, 64),
        div(widened.clone(), make_const(t16, 2)),
    ));
    assert_rewritten(&cast(
        Type::uint(8, 64),
        div(add(widened, make_const(t16, 1)), make_const(t16, 2)),
    ));
}

#[test]
fn negative_averaging() {
    let t16 = Type::int(16, 64);
    let e = sat_cast(
        Type::int(8, 1),
        div(
            sub(cast(t16, u8v("a")), cast(t16, u8v("b"))),
            make_const(t16, 2),
        ),
    );
    assert_rewritten(&e);
}

#[test]
fn saturating_widened_add_and_sub() {
    let t16 = Type::uint(16, 64);
    let e = sat_cast(
        Type::uint(8, 1),
        add(cast(t16, u8v("a")), cast(t16, u8v("b"))),
    );
    assert_rewritten(&e);
    let s16 = Type::int(16, 64);
    let e = sat_cast(
        Type::uint(8, 1),
        sub(cast(s16, u8v("a")), cast(s16, u8v("b"))),
    );
    assert_rewritten(&e);
}

#[test]
fn rounding_saturating_narrowing() {
    let a = var(Type::int(16, 64), "a");
    let t32 = Type::int(32, 64);
    let e = sat_cast(
        Type::uint(8, 1),
        div(
            add(cast(t32, a), make_const(t32, 128)),
            make_const(t32, 256),
        ),
    );
    assert_rewritten(&e);
}

#[test]
fn saturating_narrowing_by_shift() {
    let a = var(Type::int(16, 64), "a");
    let e = sat_cast(Type::uint(8, 1), div(a, make_const(Type::int(16, 64), 64)));
    assert_rewritten(&e);
}

#[test]
fn high_half_narrowing() {
    let a = var(Type::uint(16, 64), "a");
    let e = cast(
        Type::uint(8, 64),
        div(a, make_const(Type::uint(16, 64), 256)),
    );
    assert_rewritten(&e);
}

#[test]
fn widening_multiplies() {
    let t16 = Type::uint(16, 64);
    // Vector by vector.
    assert_rewritten(&mul(cast(t16, u8v("a")), cast(t16, u8v("b"))));
    // Vector by broadcast scalar.
    let k = broadcast(cast(Type::uint(16, 1), var(Type::uint(8, 1), "k")), 64);
    assert_rewritten(&mul(cast(t16, u8v("a")), k));
}

#[test]
fn widening_casts_and_double_casts() {
    assert_rewritten(&cast(Type::uint(16, 64), u8v("a")));
    assert_rewritten(&cast(Type::int(16, 64), var(Type::int(8, 64), "a")));
    // 8 to 32 bits splits through a 16-bit stage.
    assert_rewritten(&cast(Type::uint(32, 64), u8v("a")));
    assert_rewritten(&cast(Type::int(32, 64), var(Type::int(8, 64), "a")));
    // 32 to 8 bits likewise.
    assert_rewritten(&cast(Type::uint(8, 64), var(Type::int(32, 64), "x")));
    let e = sat_cast(Type::uint(8, 1), var(Type::int(32, 64), "x"));
    assert_rewritten(&e);
}

#[test]
fn pack_feeding_widened_add_switches_to_trunc() {
    // u8(u16(a) + u16(b)): the widening add comes out interleaved and the
    // pack swaps to its deinterleaving alternative.
    let t16 = Type::uint(16, 64);
    let e = cast(Type::uint(8, 64), add(cast(t16, u8v("a")), cast(t16, u8v("b"))));
    let optimized = optimize_expr(&e);
    match &optimized {
        Expr::Call { name, .. } => assert_eq!(name, "halide.hexagon.trunc.vh"),
        other => panic!("expected trunc.vh, got {}", other),
    }
    assert_rewritten(&e);
}

#[test]
fn multiply_accumulates() {
    let t16 = Type::int(16, 64);
    let i8v = |n: &str| var(Type::int(8, 64), n);
    let acc = var(t16, "acc");
    // Widening vector MAC.
    assert_rewritten(&add(
        acc.clone(),
        mul(cast(t16, i8v("a")), cast(t16, i8v("b"))),
    ));
    // Subtraction folds into the accumulate through lossless negation.
    assert_rewritten(&sub(acc.clone(), mul(var(t16, "x"), make_const(t16, 4))));
    // Power-of-two multiplier accumulates as a shift.
    assert_rewritten(&add(acc.clone(), mul(var(t16, "x"), make_const(t16, 8))));
    // Generic fallback.
    assert_rewritten(&add(acc, mul(var(t16, "x"), var(t16, "y"))));
}

#[test]
fn power_of_two_multiply_is_a_shift() {
    let t = Type::int(16, 64);
    assert_rewritten(&mul(var(t, "x"), make_const(t, 64)));
    // Non-powers of two stay multiplies.
    let e = mul(var(t, "x"), make_const(t, 3));
    assert_eq!(optimize_expr(&e), e);
}

#[test]
fn count_leading_sign_bits() {
    let x = var(Type::int(32, 32), "x");
    assert_rewritten(&max(clz(x.clone()), clz(bitwise_not(x))));
    let h = var(Type::int(16, 64), "h");
    assert_rewritten(&max(clz(bitwise_not(h.clone())), clz(h)));
}

#[test]
fn interleave_cancellation_across_let() {
    // A widened multiply bound in a let and consumed both raw and
    // deinterleaved produces the two-binding form; values must agree.
    let t16 = Type::uint(16, 64);
    let product = mul(cast(t16, u8v("a")), cast(t16, u8v("b")));
    let e = let_expr(
        "p",
        product,
        add(var(t16, "p"), var(t16, "p")),
    );
    assert_equivalent(&e);
}

#[test]
fn bounded_gather_becomes_dynamic_shuffle() {
    init_logging();
    let t = Type::int(32, 64);
    let index = add(
        broadcast(var(Type::int(32, 1), "base"), 64),
        modulo(var(t, "x"), make_const(t, 201)),
    );
    let source = load(Type::uint(16, 64), "buf", index);
    let optimized = match optimize_hexagon_shuffles(&Stmt::Evaluate {
        value: source.clone(),
    }) {
        Stmt::Evaluate { value } => value,
        _ => unreachable!(),
    };
    assert!(
        matches!(&optimized, Expr::Call { name, .. } if name == "dynamic_shuffle"),
        "expected dynamic_shuffle, got {}",
        optimized
    );

    let mut rng = StdRng::seed_from_u64(0x4845_5842);
    for _ in 0..16 {
        let mut env = Env::default();
        let base = rng.gen_range(0..32i64);
        env.vars.insert("base".to_string(), vec![base]);
        env.vars.insert(
            "x".to_string(),
            (0..64).map(|_| rng.gen_range(0..1_000_000i64)).collect(),
        );
        env.buffers.insert(
            "buf".to_string(),
            (0..256).map(|_| rng.gen_range(0..65536i64)).collect(),
        );
        assert_eq!(eval(&source, &env), eval(&optimized, &env));
    }
}

#[test]
fn evaluator_permutations_roundtrip() {
    let v: Lanes = (0..64).collect();
    assert_eq!(interleave_lanes(&deinterleave_lanes(&v)), v);
    assert_eq!(deinterleave_lanes(&interleave_lanes(&v)), v);
    let i = interleave_lanes(&v);
    assert_eq!(&i[..4], &[0, 32, 1, 33]);
}

use pyreasm_compiler::{
    AsmOpts, CodeObject, DecompileError, LineRegression, PyVersion, ReassembleError, UnitKey,
    assemble_all,
    codegen::error::AsmErrorType,
    core::{
        bytecode::{CodeFlags, ConstantData},
        opcode::OpcodeTable,
    },
    decompile_all, pretty_decompile,
};

const LISTCOMP: &str = r#"# Python 3.8
  1           0 LOAD_CONST               0 (<code object <listcomp> at 0x7f5e2c0, file "<dis>", line 1>)
              2 LOAD_CONST               1 ('<listcomp>')
              4 MAKE_FUNCTION            0
              6 LOAD_NAME                0 (y)
              8 GET_ITER
             10 CALL_FUNCTION            1
             12 RETURN_VALUE

Disassembly of <code object <listcomp> at 0x7f5e2c0, file "<dis>", line 1>:
  1           0 BUILD_LIST               0
              2 LOAD_FAST                0 (.0)
        >>    4 FOR_ITER                 8 (to 14)
              6 STORE_FAST               1 (x)
              8 LOAD_FAST                1 (x)
             10 LIST_APPEND              2
             12 JUMP_ABSOLUTE            4
        >>   14 RETURN_VALUE
"#;

const MODULE: &str = r#"Disassembly of add:
  2           0 LOAD_FAST                0 (a)
              2 LOAD_FAST                1 (b)
              4 BINARY_ADD
              6 STORE_FAST               2 (c)

  3           8 LOAD_FAST                2 (c)
             10 RETURN_VALUE

Disassembly of squares:
  6           0 LOAD_CONST               1 (<code object <genexpr> at 0x10, file "m.py", line 6>)
              2 LOAD_CONST               2 ('squares.<locals>.<genexpr>')
              4 MAKE_FUNCTION            0
              6 LOAD_FAST                0 (n)
              8 GET_ITER
             10 CALL_FUNCTION            1
             12 RETURN_VALUE

Disassembly of <code object <genexpr> at 0x10, file "m.py", line 6>:
  6           0 LOAD_FAST                0 (.0)
        >>    2 FOR_ITER                14 (to 18)
              4 STORE_FAST               1 (i)
              6 LOAD_FAST                1 (i)
              8 LOAD_CONST               0 (2)
             10 BINARY_POWER
             12 YIELD_VALUE
             14 POP_TOP
             16 JUMP_ABSOLUTE            2
        >>   18 LOAD_CONST               1 (None)
             20 RETURN_VALUE
"#;

fn table() -> &'static OpcodeTable {
    OpcodeTable::for_version(PyVersion::default()).unwrap()
}

#[test]
fn test_add_constants() {
    let units = assemble_all(
        "  1           0 LOAD_CONST               0 (1)
              2 LOAD_CONST               1 (2)
              4 BINARY_ADD
              6 RETURN_VALUE",
        &AsmOpts::default(),
    )
    .unwrap();
    assert_eq!(units.len(), 1);
    let code = &units[0].code;
    let op = |name| table().opcode(name).unwrap();
    assert_eq!(
        code.instructions.to_bytes(),
        [
            op("LOAD_CONST"),
            0,
            op("LOAD_CONST"),
            1,
            op("BINARY_ADD"),
            0,
            op("RETURN_VALUE"),
            0
        ]
    );
    assert_eq!(
        &*code.constants,
        [
            ConstantData::Integer { value: 1.into() },
            ConstantData::Integer { value: 2.into() },
        ]
    );
    assert_eq!(code.arg_count, 0);
    assert!(code.lnotab.is_empty());
}

#[test]
fn test_units_in_listing_order() {
    let units = assemble_all(LISTCOMP, &AsmOpts::default()).unwrap();
    let keys: Vec<_> = units.iter().map(|unit| unit.key.to_string()).collect();
    assert_eq!(keys, ["main", "<code object <listcomp> at 0x7f5e2c0>"]);

    let listcomp = &units[1];
    assert_eq!(listcomp.arg_names, [".0"]);
    assert_eq!(&*listcomp.code.varnames, [".0", "x"]);
    assert_eq!(listcomp.code.local_count, 2);
    assert_eq!(listcomp.code.obj_name, "<listcomp>");

    let main = &units[0];
    assert_eq!(
        main.code.constants[0],
        ConstantData::Code {
            code: Box::new(listcomp.code.clone())
        }
    );
    assert_eq!(&*main.code.names, ["y"]);
}

#[test]
fn test_nested_unit_must_come_later() {
    // the listcomp body listed before its user cannot be resolved
    let (main, listcomp) = LISTCOMP.split_at(LISTCOMP.find("Disassembly").unwrap());
    let swapped = format!("{}\n{}", listcomp, main.replace("# Python 3.8\n", ""));
    let err = assemble_all(&swapped, &AsmOpts::default()).unwrap_err();
    let ReassembleError::Asm(err) = err else {
        panic!("expected an assembly error");
    };
    assert!(matches!(err.error, AsmErrorType::MissingCodeObject(_)));
}

#[test]
fn test_duplicate_units_are_rejected() {
    let text = "\
Disassembly of __init__:
  3           0 LOAD_CONST               0 (None)
              2 RETURN_VALUE

Disassembly of __init__:
  7           0 LOAD_CONST               0 (None)
              2 RETURN_VALUE
";
    let err = assemble_all(text, &AsmOpts::default()).unwrap_err();
    let ReassembleError::Asm(err) = err else {
        panic!("expected an assembly error");
    };
    assert!(matches!(err.error, AsmErrorType::DuplicateUnit(_)));
}

#[test]
fn test_class_headers_are_skipped() {
    let text = "\
Disassembly of Point:
Disassembly of __init__:
  3           0 LOAD_FAST                1 (x)
              2 LOAD_FAST                0 (self)
              4 STORE_ATTR               0 (x)
              6 LOAD_CONST               0 (None)
              8 RETURN_VALUE

Disassembly of norm:
  6           0 LOAD_FAST                0 (self)
              2 LOAD_ATTR                0 (x)
              4 RETURN_VALUE
";
    let units = assemble_all(text, &AsmOpts::default()).unwrap();
    let keys: Vec<_> = units.iter().map(|unit| unit.key.to_string()).collect();
    assert_eq!(keys, ["__init__", "norm"]);
}

#[test]
fn test_operand_too_wide_for_extended_arg() {
    let text = "\
  1           0 EXTENDED_ARG             1
              2 JUMP_ABSOLUTE        70000";
    let err = assemble_all(text, &AsmOpts::default()).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"in main: EXTENDED_ARG at item 0 lists 1, but the operand after it needs 273"
    );
}

#[test]
fn test_module_functions() {
    let units = assemble_all(MODULE, &AsmOpts::default()).unwrap();
    assert_eq!(units.len(), 3);
    let add = &units[0];
    assert_eq!(add.key, UnitKey::Named("add".to_owned()));
    assert_eq!(add.arg_names, ["a", "b"]);
    assert_eq!(add.code.first_line_number, 2);
    assert_eq!(&*add.code.lnotab, [8, 1]);

    let genexpr = &units[2];
    assert!(genexpr.key.is_anonymous());
    assert!(genexpr.code.flags.contains(CodeFlags::GENERATOR));
    assert_eq!(
        &*genexpr.code.constants,
        [ConstantData::Integer { value: 2.into() }, ConstantData::None]
    );
}

#[test]
fn test_closure_conflict() {
    let text = "\
  1           0 LOAD_CLOSURE             0 (x)
              2 LOAD_DEREF               0 (x)
              4 STORE_DEREF              0 (y)";
    let err = assemble_all(text, &AsmOpts::default()).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @r#"in main: cell variable 0 is "x", but "y" claims the same slot"#
    );
}

#[test]
fn test_line_regression_policy() {
    let text = "\
  3           0 LOAD_CONST               0 (None)
  2           2 RETURN_VALUE";
    assert!(assemble_all(text, &AsmOpts::default()).is_err());
    let opts = AsmOpts {
        line_regression: LineRegression::Warn,
        ..AsmOpts::default()
    };
    let units = assemble_all(text, &opts).unwrap();
    assert_eq!(units[0].code.first_line_number, 3);
}

#[test]
fn test_disassembly_round_trip() {
    let units = assemble_all(MODULE, &AsmOpts::default()).unwrap();
    for unit in &units {
        let listing = unit.code.display_expand_code_objects(table()).to_string();
        let again = assemble_all(&listing, &AsmOpts::default()).unwrap();
        // a listing without a header always comes back as `main`
        let mut code = again[0].code.clone();
        assert_eq!(code.obj_name, "main");
        code.obj_name.clone_from(&unit.code.obj_name);
        assert_eq!(code, unit.code, "{}", unit.key);
        assert_eq!(again[0].arg_names, unit.arg_names);
    }
}

#[test]
fn test_round_trip_display() {
    let units = assemble_all(MODULE, &AsmOpts::default()).unwrap();
    insta::assert_snapshot!(units[0].code.display(table()).to_string(), @r"
      2           0 LOAD_FAST                0 (a)
                  2 LOAD_FAST                1 (b)
                  4 BINARY_ADD
                  6 STORE_FAST               2 (c)

      3           8 LOAD_FAST                2 (c)
                 10 RETURN_VALUE
    ");
}

fn fake_decompiler(code: &CodeObject, _: PyVersion) -> Result<String, DecompileError> {
    Ok(format!(
        "# uncompyle6 version 3.7.4\n# Decompiled from: Python 3.8\nreturn {}",
        code.varnames.join(" + ")
    ))
}

#[test]
fn test_decompile_all_strips_comments() {
    let units = decompile_all(MODULE, &AsmOpts::default(), &fake_decompiler).unwrap();
    assert_eq!(units[0].source, "return a + b + c");
}

#[test]
fn test_pretty_decompile() {
    let source = pretty_decompile(MODULE, &AsmOpts::default(), &fake_decompiler, "    ").unwrap();
    insta::assert_snapshot!(source, @r"
    def add(a,b):
        return a + b + c
    def squares(n):
        return n
    ");
}

#[test]
fn test_decompiler_failure() {
    let failing = |_: &CodeObject, _: PyVersion| -> Result<String, DecompileError> {
        Err(DecompileError::Failed("no luck".to_owned()))
    };
    let err = decompile_all(MODULE, &AsmOpts::default(), &failing).unwrap_err();
    assert!(matches!(err, ReassembleError::Decompile(_)));
}

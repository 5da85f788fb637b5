//! Branches, switch tables and exception clauses keep their meaning when probes are inserted.

mod common;

use cilcover::{
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags},
    prelude::*,
};
use common::*;

const FLOW: [&str; 16] = [
    "static void Loop()",
    "{",
    "    int i = 0;",
    "    while (i < 10)",
    "        i++;",
    "}",
    "static void Guarded()",
    "{",
    "    try { Run(); }",
    "    catch { Recover(); }",
    "    return;",
    "}",
    "static void Pick(int n)",
    "{",
    "    switch (n) { case 0: Zero(); break; default: Other(); break; }",
    "}",
];

fn loop_method() -> Result<MethodDef> {
    method(
        "Loop",
        &[
            0x16, // IL_0000: ldc.i4.0
            0x0A, // IL_0001: stloc.0
            0x2B, 0x04, // IL_0002: br.s IL_0008
            0x06, // IL_0004: ldloc.0
            0x17, // IL_0005: ldc.i4.1
            0x58, // IL_0006: add
            0x0A, // IL_0007: stloc.0
            0x06, // IL_0008: ldloc.0
            0x1F, 0x0A, // IL_0009: ldc.i4.s 10
            0x32, 0xF7, // IL_000b: blt.s IL_0004
            0x2A, // IL_000d: ret
        ],
        &[
            point(0x00, 0, (3, 5), (3, 15)),
            point(0x04, 0, (5, 9), (5, 13)),
            point(0x08, 0, (4, 12), (4, 18)),
            point(0x0D, 0, (6, 1), (6, 2)),
        ],
    )
}

fn guarded_method() -> Result<MethodDef> {
    let mut guarded = method(
        "Guarded",
        &[
            0x00, // IL_0000: nop
            0xDE, 0x03, // IL_0001: leave.s IL_0006
            0x26, // IL_0003: pop
            0xDE, 0x00, // IL_0004: leave.s IL_0006
            0x2A, // IL_0006: ret
        ],
        &[
            point(0x00, 0, (9, 11), (9, 17)),
            point(0x03, 0, (10, 13), (10, 23)),
            point(0x06, 0, (11, 5), (11, 12)),
        ],
    )?;

    let body = guarded.body.as_mut().unwrap();
    let try_start = body.instructions.find_by_offset(0x00).unwrap();
    let handler_start = body.instructions.find_by_offset(0x03).unwrap();
    let handler_end = body.instructions.find_by_offset(0x06).unwrap();
    body.exception_handlers.push(ExceptionHandler {
        flags: ExceptionHandlerFlags::EXCEPTION,
        try_start,
        try_end: Some(handler_start),
        handler_start,
        handler_end: Some(handler_end),
        filter_start: None,
        class_token: Token::new(0x0100_0001),
    });
    Ok(guarded)
}

fn pick_method() -> Result<MethodDef> {
    method(
        "Pick",
        &[
            0x02, // IL_0000: ldarg.0
            0x45, 0x01, 0x00, 0x00, 0x00, // IL_0001: switch (IL_000d)
            0x03, 0x00, 0x00, 0x00, //
            0x00, // IL_000a: nop
            0x2B, 0x01, // IL_000b: br.s IL_000e
            0x00, // IL_000d: nop
            0x2A, // IL_000e: ret
        ],
        &[
            point(0x00, 0, (15, 5), (15, 15)),
            point(0x0A, 0, (15, 50), (15, 58)),
            point(0x0D, 0, (15, 26), (15, 33)),
            point(0x0E, 0, (16, 1), (16, 2)),
        ],
    )
}

/// `br.s` over ten probed statements to an unprobed `ret`.
fn far_method() -> Result<MethodDef> {
    let mut code = vec![0x2B, 0x0A];
    code.extend([0x00; 10]);
    code.push(0x2A);
    let points: Vec<_> = (2..12).map(|offset| point(offset, 0, (3, 5), (3, 15))).collect();
    method("Far", &code, &points)
}

struct FlowFixture {
    workspace: Workspace,
    source: String,
    module: std::path::PathBuf,
}

fn flow_fixture() -> Result<FlowFixture> {
    let workspace = Workspace::new()?;
    let source = workspace.source("src/Flow.cs", &FLOW)?;
    let flow = type_with(
        "App",
        "Flow",
        vec![loop_method()?, guarded_method()?, pick_method()?, far_method()?],
    );
    let mut app = module("App.dll", &[&source], vec![flow]);
    let module = workspace.module("App.dll", &mut app)?;
    Ok(FlowFixture {
        workspace,
        source,
        module,
    })
}

fn instrument(fixture: &FlowFixture) -> Result<(Module, Module, RunResult)> {
    let original = load(&fixture.module)?;
    let config = fixture.workspace.config(&[&fixture.source]);
    let result = Instrumenter::new(config).run(&[&fixture.module])?;
    Ok((original, load(&fixture.module)?, result))
}

fn listings(original: &Module, rewritten: &Module, name: &str) -> (Vec<String>, Vec<String>) {
    let before = method_named(original, name).body.as_ref().unwrap();
    let after = method_named(rewritten, name).body.as_ref().unwrap();
    (
        without_probes(original, before),
        without_probes(rewritten, after),
    )
}

#[test]
fn loop_branches_enter_through_probes() -> Result<()> {
    let fixture = flow_fixture()?;
    let (original, rewritten, _) = instrument(&fixture)?;

    let body = method_named(&rewritten, "Loop").body.as_ref().unwrap();
    assert_eq!(probes(&rewritten, body).len(), 3);
    assert_eq!(body.max_stack, 10);

    let (before, after) = listings(&original, &rewritten, "Loop");
    assert_eq!(after, before);
    assert_eq!(after[2], "br.s #7");
    assert_eq!(after[9], "blt.s #3");

    for (_, instruction) in body.instructions.iter() {
        if let Operand::Target(target) = instruction.operand {
            let entered = body.instructions.get(target).unwrap();
            assert_eq!(entered.mnemonic, "ldstr", "loop edges run the probe");
        }
    }
    Ok(())
}

#[test]
fn exception_clauses_cover_probes() -> Result<()> {
    let fixture = flow_fixture()?;
    let (original, rewritten, _) = instrument(&fixture)?;

    let (before, after) = listings(&original, &rewritten, "Guarded");
    assert_eq!(after, before);
    assert!(after
        .last()
        .unwrap()
        .ends_with("try #0..#2 handler #2..#4 filter none"));

    let body = method_named(&rewritten, "Guarded").body.as_ref().unwrap();
    let clause = &body.exception_handlers[0];
    let mnemonic = |id: Option<InstrId>| body.instructions.get(id.unwrap()).unwrap().mnemonic;
    assert_eq!(mnemonic(Some(clause.try_start)), "ldstr");
    assert_eq!(mnemonic(clause.try_end), "ldstr");
    assert_eq!(mnemonic(Some(clause.handler_start)), "ldstr");
    assert_eq!(mnemonic(clause.handler_end), "ldstr");
    assert_eq!(clause.class_token, Token::new(0x0100_0001));
    Ok(())
}

#[test]
fn switch_cases_enter_through_probes() -> Result<()> {
    let fixture = flow_fixture()?;
    let (original, rewritten, result) = instrument(&fixture)?;

    let (before, after) = listings(&original, &rewritten, "Pick");
    assert_eq!(after, before);
    assert_eq!(after[1], "switch #4");

    let texts: Vec<&str> = result
        .points()
        .filter(|point| point.method.name == "Pick")
        .map(|point| point.instruction.as_str())
        .collect();
    assert_eq!(
        texts,
        vec!["IL_0000: ldarg.0", "IL_000a: nop", "IL_000d: nop"]
    );
    Ok(())
}

#[test]
fn short_branches_widen_when_probes_push_them_out_of_range() -> Result<()> {
    let fixture = flow_fixture()?;
    let (original, rewritten, _) = instrument(&fixture)?;

    let (before, after) = listings(&original, &rewritten, "Far");
    assert_eq!(before[0], "br.s #11");
    assert_eq!(after[0], "br #11");
    assert_eq!(after[1..], before[1..]);

    let body = method_named(&rewritten, "Far").body.as_ref().unwrap();
    assert_eq!(probes(&rewritten, body).len(), 10);
    Ok(())
}

#[test]
fn every_probe_is_reported_once() -> Result<()> {
    let fixture = flow_fixture()?;
    let (_, rewritten, result) = instrument(&fixture)?;

    let mut embedded = embedded_ids(&rewritten);
    embedded.sort_unstable();
    let reported: Vec<u32> = result.points().map(|point| point.id).collect();
    assert_eq!(embedded, reported);
    assert_eq!(reported, (1..=19).collect::<Vec<_>>());
    Ok(())
}

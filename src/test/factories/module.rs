//! Factory methods for module test data.

use std::path::{Path, PathBuf};

use crate::{
    metadata::module::{MemberRef, Module, ModuleSymbols, TypeDef},
    test::MethodBuilder,
};

/// Source document referenced by [`sample_module`].
pub const SAMPLE_DOCUMENT: &str = "/work/src/Program.cs";

/// Source text of [`SAMPLE_DOCUMENT`].
pub const SAMPLE_SOURCE: &str = "class Program\n{\n    static void Main()\n    {\n        Console.WriteLine(\"Hello\");\n    }\n}\n";

/// A module with `App.Program::Main` printing a string:
///
/// ```text
/// IL_0000: nop                      (4,5)-(4,6)     "{"
/// IL_0001: ldstr "Hello"            (5,9)-(5,36)
/// IL_0006: call [System.Console]System.Console::WriteLine
/// IL_000b: ret                      (6,5)-(6,6)     "}"
/// ```
pub fn sample_module() -> Module {
    sample_module_with_document(SAMPLE_DOCUMENT)
}

/// [`sample_module`] with its debug information pointing at `document`.
pub fn sample_module_with_document(document: &str) -> Module {
    let mut module = Module::new("App.dll");
    module.user_strings.push("Hello".to_string());
    module.member_refs.push(MemberRef::new(
        "System.Console",
        "System.Console",
        "WriteLine",
        vec![0x00, 0x01, 0x01, 0x0E],
    ));

    let main = MethodBuilder::new("Main")
        .with_code(
            8,
            &[
                0x00, // nop
                0x72, 0x01, 0x00, 0x00, 0x70, // ldstr "Hello"
                0x28, 0x01, 0x00, 0x00, 0x0A, // call WriteLine
                0x2A, // ret
            ],
        )
        .with_point(0x00, 0, (4, 5, 4, 6))
        .with_point(0x01, 0, (5, 9, 5, 36))
        .with_point(0x0B, 0, (6, 5, 6, 6))
        .build();

    let mut program = TypeDef::new("App", "Program");
    program.methods.push(main);
    module.types.push(program);

    module.symbols = Some(ModuleSymbols {
        documents: vec![document.to_string()],
    });
    module
}

/// Write [`sample_module`] as `App.dll` with symbols and source file into `dir`.
///
/// Returns the module path and the absolute path of the source document.
pub fn write_sample(dir: &Path) -> (PathBuf, String) {
    let source = dir.join("src").join("Program.cs");
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(&source, SAMPLE_SOURCE).unwrap();

    let document = source.to_string_lossy().into_owned();
    let module_path = dir.join("App.dll");
    sample_module_with_document(&document)
        .write_to_file(&module_path)
        .unwrap();
    (module_path, document)
}

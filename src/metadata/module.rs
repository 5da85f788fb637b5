//! In-memory object model of a module and its debug information.
//!
//! A [`Module`] owns everything the image file stores: module-level custom attributes, member
//! references into other modules, the user string heap and the type hierarchy with its methods.
//! If a symbol file accompanies the module, its documents are kept in [`ModuleSymbols`] and its
//! sequence points are attached to the methods they describe.
//!
//! Token numbering follows the image layout: MethodDef rows are numbered in pre-order over the
//! type hierarchy (a type's own methods, then its nested types), MemberRef and UserString rows
//! are 1-based indexes into their lists.
//!
//! # Examples
//!
//! ```rust
//! use cilcover::metadata::module::{MemberRef, Module};
//!
//! let mut module = Module::new("App.dll");
//! let greeting = module.intern_user_string("hello");
//! assert_eq!(module.intern_user_string("hello"), greeting);
//! assert_eq!(module.user_string(greeting), Some("hello"));
//!
//! let hit = MemberRef::new("Lib", "Lib.Api", "Hit", vec![0x00, 0x01, 0x01, 0x08]);
//! let token = module.import_member_ref(hit.clone());
//! assert_eq!(module.import_member_ref(hit), token);
//! ```

use std::path::Path;

use crate::{
    assembly::Operand,
    metadata::{
        loader,
        method::MethodDef,
        symbols::SymbolFile,
        token::Token,
        writer,
    },
    Result,
};

/// Name of the module type that holds module-level members.
pub const MODULE_TYPE_NAME: &str = "<Module>";

/// A module-level custom attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomAttribute {
    /// Full name of the attribute type
    pub type_name: String,
}

/// A reference to a member defined in another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    /// Name of the module or assembly defining the member
    pub scope: String,
    /// Full name of the declaring type
    pub type_name: String,
    /// Member name
    pub name: String,
    /// Member signature blob
    pub signature: Vec<u8>,
}

impl MemberRef {
    /// Create a member reference.
    #[must_use]
    pub fn new(scope: &str, type_name: &str, name: &str, signature: Vec<u8>) -> Self {
        MemberRef {
            scope: scope.to_string(),
            type_name: type_name.to_string(),
            name: name.to_string(),
            signature,
        }
    }
}

impl std::fmt::Display for MemberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]{}::{}", self.scope, self.type_name, self.name)
    }
}

/// A type definition with its methods and nested types.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Raw type attributes
    pub flags: u32,
    /// Namespace, empty for nested types and the global namespace
    pub namespace: String,
    /// Type name
    pub name: String,
    /// Methods declared by this type
    pub methods: Vec<MethodDef>,
    /// Types nested in this type
    pub nested_types: Vec<TypeDef>,
}

impl TypeDef {
    /// Create an empty type.
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        TypeDef {
            flags: 0,
            namespace: namespace.to_string(),
            name: name.to_string(),
            methods: Vec::new(),
            nested_types: Vec::new(),
        }
    }

    /// Namespace-qualified name, e.g. `App.Program`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Module-wide part of the debug information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSymbols {
    /// Source document paths, indexed by [`crate::metadata::sequencepoints::SequencePoint::document`]
    pub documents: Vec<String>,
}

/// A loaded module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Module-level custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Member references, row `n` at index `n - 1`
    pub member_refs: Vec<MemberRef>,
    /// User strings, row `n` at index `n - 1`
    pub user_strings: Vec<String>,
    /// Top-level types; the first one is the module type
    pub types: Vec<TypeDef>,
    /// Debug information, `None` if no symbol file accompanies the module
    pub symbols: Option<ModuleSymbols>,
}

fn collect_methods<'a>(types: &'a [TypeDef], methods: &mut Vec<&'a MethodDef>) {
    for ty in types {
        methods.extend(ty.methods.iter());
        collect_methods(&ty.nested_types, methods);
    }
}

fn collect_methods_mut<'a>(types: &'a mut [TypeDef], methods: &mut Vec<&'a mut MethodDef>) {
    for ty in types.iter_mut() {
        let TypeDef {
            methods: own,
            nested_types,
            ..
        } = ty;
        methods.extend(own.iter_mut());
        collect_methods_mut(nested_types, methods);
    }
}

fn row_token(table: u8, index: usize) -> Token {
    #[allow(clippy::cast_possible_truncation)]
    Token::from_parts(table, index as u32 + 1)
}

impl Module {
    /// Create an empty module containing only the module type.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            custom_attributes: Vec::new(),
            member_refs: Vec::new(),
            user_strings: Vec::new(),
            types: vec![TypeDef::new("", MODULE_TYPE_NAME)],
            symbols: None,
        }
    }

    /// Load a module from disk together with its symbol file, if one exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if a file cannot be read, or any parse error of the
    /// image or the symbol file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let mut module = Self::parse(&data)?;

        let symbols_path = SymbolFile::path_for(path);
        if symbols_path.is_file() {
            module.attach_symbols(SymbolFile::from_file(&symbols_path)?)?;
        }

        Ok(module)
    }

    /// Parse a module image from memory, without debug information.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for invalid images.
    pub fn parse(data: &[u8]) -> Result<Self> {
        loader::parse_image(data)
    }

    /// Attach the contents of a symbol file.
    ///
    /// Sequence points whose offset does not start an instruction are dropped.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the symbol file references documents it does not
    /// declare.
    pub fn attach_symbols(&mut self, symbols: SymbolFile) -> Result<()> {
        loader::attach_symbols(self, symbols)
    }

    /// Serialize the module image and, if present, the symbol file.
    ///
    /// Method bodies are re-encoded, which may widen short branches.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a body or the debug information cannot be encoded.
    pub fn to_bytes(&mut self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        writer::write_module(self)
    }

    /// Write the module image to `path` and the symbol file next to it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on I/O failures or any serialization error.
    pub fn write_to_file(&mut self, path: &Path) -> Result<()> {
        let (image, symbols) = self.to_bytes()?;
        std::fs::write(path, image)?;
        if let Some(symbols) = symbols {
            std::fs::write(SymbolFile::path_for(path), symbols)?;
        }
        Ok(())
    }

    /// Returns `true` if the module carries a custom attribute of type `type_name`.
    #[must_use]
    pub fn has_custom_attribute(&self, type_name: &str) -> bool {
        self.custom_attributes
            .iter()
            .any(|attribute| attribute.type_name == type_name)
    }

    /// Add a module-level custom attribute.
    pub fn add_custom_attribute(&mut self, type_name: &str) {
        self.custom_attributes.push(CustomAttribute {
            type_name: type_name.to_string(),
        });
    }

    /// Import a member reference, reusing an identical existing row.
    pub fn import_member_ref(&mut self, member: MemberRef) -> Token {
        if let Some(index) = self.member_refs.iter().position(|known| *known == member) {
            return row_token(Token::MEMBER_REF, index);
        }

        self.member_refs.push(member);
        row_token(Token::MEMBER_REF, self.member_refs.len() - 1)
    }

    /// Returns the member reference behind `token`.
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRef> {
        if token.table() != Token::MEMBER_REF || token.row() == 0 {
            return None;
        }
        self.member_refs.get(token.row() as usize - 1)
    }

    /// Add `value` to the user string heap, reusing an identical existing entry.
    pub fn intern_user_string(&mut self, value: &str) -> Token {
        if let Some(index) = self.user_strings.iter().position(|known| known == value) {
            return row_token(Token::USER_STRING, index);
        }

        self.user_strings.push(value.to_string());
        row_token(Token::USER_STRING, self.user_strings.len() - 1)
    }

    /// Returns the user string behind `token`.
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<&str> {
        if token.table() != Token::USER_STRING || token.row() == 0 {
            return None;
        }
        self.user_strings
            .get(token.row() as usize - 1)
            .map(String::as_str)
    }

    /// All methods with their MethodDef tokens, in token order.
    #[must_use]
    pub fn methods(&self) -> Vec<(Token, &MethodDef)> {
        let mut methods = Vec::new();
        collect_methods(&self.types, &mut methods);
        methods
            .into_iter()
            .enumerate()
            .map(|(index, method)| (row_token(Token::METHOD_DEF, index), method))
            .collect()
    }

    /// All methods mutably, in token order.
    pub fn methods_mut(&mut self) -> Vec<&mut MethodDef> {
        let mut methods = Vec::new();
        collect_methods_mut(&mut self.types, &mut methods);
        methods
    }

    /// Returns the method behind a MethodDef token.
    pub fn method_mut(&mut self, token: Token) -> Option<&mut MethodDef> {
        if token.table() != Token::METHOD_DEF || token.row() == 0 {
            return None;
        }
        self.methods_mut()
            .into_iter()
            .nth(token.row() as usize - 1)
    }

    /// Source document at `index` of the debug information.
    #[must_use]
    pub fn document(&self, index: usize) -> Option<&str> {
        self.symbols
            .as_ref()
            .and_then(|symbols| symbols.documents.get(index))
            .map(String::as_str)
    }

    /// The static constructor of the module type, created with a `ret`-only body if absent.
    ///
    /// Adding the method shifts the MethodDef rows after it; every MethodDef token operand in
    /// the module's bodies is renumbered accordingly.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the first type is not the module type or the
    /// existing initializer has no body.
    pub fn module_initializer_mut(&mut self) -> Result<&mut MethodDef> {
        match self.types.first() {
            Some(ty) if ty.name == MODULE_TYPE_NAME && ty.namespace.is_empty() => {}
            _ => {
                return Err(malformed_error!(
                    "Module {} does not start with the {} type",
                    self.name,
                    MODULE_TYPE_NAME
                ))
            }
        }

        let existing = self.types[0]
            .methods
            .iter()
            .position(MethodDef::is_type_initializer);
        let index = match existing {
            Some(index) => index,
            None => {
                #[allow(clippy::cast_possible_truncation)]
                let row = self.types[0].methods.len() as u32 + 1;
                self.shift_method_rows(row);
                self.types[0].methods.push(MethodDef::new_type_initializer()?);
                self.types[0].methods.len() - 1
            }
        };

        let initializer = &mut self.types[0].methods[index];
        if initializer.body.is_none() {
            return Err(malformed_error!(
                "Module initializer of {} has no body",
                self.name
            ));
        }
        Ok(initializer)
    }

    /// Increment every MethodDef token operand referring to row `from` or later.
    fn shift_method_rows(&mut self, from: u32) {
        for method in self.methods_mut() {
            let Some(body) = method.body.as_mut() else {
                continue;
            };
            for instruction in body.instructions.instructions_mut() {
                if let Operand::Token(token) = &mut instruction.operand {
                    if token.table() == Token::METHOD_DEF && token.row() >= from {
                        *token = Token::from_parts(Token::METHOD_DEF, token.row() + 1);
                    }
                }
            }
        }
    }

    /// Returns `true` if the module type already has a static constructor.
    #[must_use]
    pub fn has_module_initializer(&self) -> bool {
        self.types
            .first()
            .is_some_and(|ty| ty.methods.iter().any(MethodDef::is_type_initializer))
    }
}

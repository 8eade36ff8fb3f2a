use std::fmt;

use super::pool::{InstructionPool, Span};
use super::reader::ByteCursor;
use super::DecodeError;

pub const MAGIC: u32 = 0x6d736100;
pub const VERSION: u32 = 1;

pub const SECTION_CUSTOM: u8 = 0;
pub const SECTION_TYPE: u8 = 1;
pub const SECTION_IMPORT: u8 = 2;
pub const SECTION_FUNCTION: u8 = 3;
pub const SECTION_TABLE: u8 = 4;
pub const SECTION_MEMORY: u8 = 5;
pub const SECTION_GLOBAL: u8 = 6;
pub const SECTION_EXPORT: u8 = 7;
pub const SECTION_START: u8 = 8;
pub const SECTION_ELEMENT: u8 = 9;
pub const SECTION_CODE: u8 = 10;
pub const SECTION_DATA: u8 = 11;

const FUNCTION_TYPE_FORM: u8 = 0x60;
const FUNCREF: u8 = 0x70;

/// A decoded binary module
///
/// Immutable once decoded. All instruction spans (global initialisers, element and data
/// offsets, function bodies) index into `pool`. A section kind that appears more than
/// once keeps only its last occurrence; custom sections accumulate.
#[derive(Debug, Default)]
pub struct Module {
    pub magic: u32,
    pub version: u32,

    pub custom: Vec<CustomSection>,
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<Element>,
    pub code: Vec<FunctionBody>,
    pub data: Vec<Data>,

    pub pool: InstructionPool,
}

impl Module {
    pub fn decode(cursor: &mut ByteCursor) -> Result<Module, DecodeError> {
        let mut module = Module::default();
        read_header(cursor, &mut module.magic, &mut module.version)?;

        while !cursor.is_empty() {
            let id = cursor.peek()?;
            if id > SECTION_DATA {
                return Err(DecodeError::UnknownSection(id));
            }
            cursor.read_u8()?;
            let size = cursor.read_vu32()?;
            let mut payload = cursor.sub_cursor(size as usize)?;
            module.read_section(id, &mut payload)?;
            if !payload.is_empty() {
                return Err(DecodeError::SectionSizeMismatch {
                    id,
                    remaining: payload.remaining(),
                });
            }
        }

        if module.functions.len() != module.code.len() {
            return Err(DecodeError::FunctionCountMismatch {
                functions: module.functions.len(),
                bodies: module.code.len(),
            });
        }

        log::debug!(
            "decoded module: {} types, {} imports, {} functions, {} globals, {} exports, {} pool words",
            module.types.len(),
            module.imports.len(),
            module.functions.len(),
            module.globals.len(),
            module.exports.len(),
            module.pool.len()
        );

        Ok(module)
    }

    fn read_section(&mut self, id: u8, payload: &mut ByteCursor) -> Result<(), DecodeError> {
        match id {
            SECTION_CUSTOM => {
                let name = payload.read_string()?;
                let data = payload.read_all().to_vec();
                self.custom.push(CustomSection { name, data });
            }
            SECTION_TYPE => self.types = payload.read_vec(FunctionType::decode)?,
            SECTION_IMPORT => self.imports = payload.read_vec(Import::decode)?,
            SECTION_FUNCTION => self.functions = payload.read_vec(|c| c.read_vu32())?,
            SECTION_TABLE => self.tables = payload.read_vec(TableType::decode)?,
            SECTION_MEMORY => self.memories = payload.read_vec(Limits::decode)?,
            SECTION_GLOBAL => {
                let pool = &mut self.pool;
                self.globals = payload.read_vec(|c| Global::decode(c, pool))?;
            }
            SECTION_EXPORT => self.exports = payload.read_vec(Export::decode)?,
            SECTION_START => self.start = Some(payload.read_vu32()?),
            SECTION_ELEMENT => {
                let pool = &mut self.pool;
                self.elements = payload.read_vec(|c| Element::decode(c, pool))?;
            }
            SECTION_CODE => {
                let pool = &mut self.pool;
                self.code = payload.read_vec(|c| FunctionBody::decode(c, pool))?;
            }
            SECTION_DATA => {
                let pool = &mut self.pool;
                self.data = payload.read_vec(|c| Data::decode(c, pool))?;
            }
            _ => return Err(DecodeError::UnknownSection(id)),
        }
        Ok(())
    }

    pub fn imported_function_count(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.external_kind, ExternalKind::Function(_)))
            .count()
    }

    /// Type index of a function in the combined (imports first) index space
    pub fn function_type_index(&self, index: u32) -> Option<u32> {
        let imported = self
            .imports
            .iter()
            .filter_map(|i| match i.external_kind {
                ExternalKind::Function(type_index) => Some(type_index),
                _ => None,
            })
            .nth(index as usize);
        match imported {
            Some(type_index) => Some(type_index),
            None => {
                let local = index as usize - self.imported_function_count();
                self.functions.get(local).copied()
            }
        }
    }

    pub fn function_type(&self, index: u32) -> Option<&FunctionType> {
        self.function_type_index(index)
            .and_then(|t| self.types.get(t as usize))
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    pub fn get_function_name(&self, index: u32) -> Option<&String> {
        self.exports.iter().find_map(|export| match export.index {
            ExportIndex::Function(idx) if idx == index => Some(&export.name),
            _ => None,
        })
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "magic = 0x{:08x} version = {}", self.magic, self.version)?;
        for (i, t) in self.types.iter().enumerate() {
            writeln!(f, "type[{}] {}", i, t)?;
        }
        for import in &self.imports {
            writeln!(f, "import {}.{} {}", import.module, import.name, import.external_kind)?;
        }
        for table in &self.tables {
            writeln!(f, "table {}", table)?;
        }
        for memory in &self.memories {
            writeln!(f, "memory {}", memory)?;
        }
        for (i, global) in self.globals.iter().enumerate() {
            writeln!(f, "global[{}] {}", i, global.global_type)?;
        }
        for export in &self.exports {
            writeln!(f, "export \"{}\" {}", export.name, export.index)?;
        }
        if let Some(start) = self.start {
            writeln!(f, "start {}", start)?;
        }
        for element in &self.elements {
            writeln!(f, "elem table={} functions={:?}", element.table_index, element.init)?;
        }
        for data in &self.data {
            writeln!(f, "data memory={} bytes={}", data.memory_index, data.init.len())?;
        }
        for custom in &self.custom {
            writeln!(f, "custom \"{}\" bytes={}", custom.name, custom.data.len())?;
        }
        Ok(())
    }
}

fn read_header(cursor: &mut ByteCursor, magic: &mut u32, version: &mut u32) -> Result<(), DecodeError> {
    let bad_header = |magic, version| DecodeError::BadHeader { magic, version };
    *magic = cursor.read_u32().map_err(|_| bad_header(0, 0))?;
    if *magic != MAGIC {
        return Err(bad_header(*magic, 0));
    }
    *version = cursor.read_u32().map_err(|_| bad_header(*magic, 0))?;
    if *version != VERSION {
        return Err(bad_header(*magic, *version));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub fn decode(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0x7f => Ok(ValueType::I32),
            0x7e => Ok(ValueType::I64),
            0x7d => Ok(ValueType::F32),
            0x7c => Ok(ValueType::F64),
            _ => Err(DecodeError::InvalidValueType(byte)),
        }
    }

    fn read(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        ValueType::decode(cursor.read_u8()?)
    }

    pub fn code(&self) -> u8 {
        match self {
            ValueType::I32 => 0x7f,
            ValueType::I64 => 0x7e,
            ValueType::F32 => 0x7d,
            ValueType::F64 => 0x7c,
        }
    }

    /// i32 and f32 only occupy the low half of a 64-bit word
    pub fn is_32_bit(&self) -> bool {
        matches!(self, ValueType::I32 | ValueType::F32)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    pub return_types: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(parameters: Vec<ValueType>, return_types: Vec<ValueType>) -> Self {
        FunctionType {
            parameters,
            return_types,
        }
    }

    fn decode(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        let form = cursor.read_u8()?;
        if form != FUNCTION_TYPE_FORM {
            return Err(DecodeError::InvalidTypeForm(form));
        }
        Ok(FunctionType {
            parameters: cursor.read_vec(ValueType::read)?,
            return_types: cursor.read_vec(ValueType::read)?,
        })
    }

    /// The single result type, MVP functions return at most one value
    pub fn result(&self) -> Option<ValueType> {
        self.return_types.first().copied()
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |types: &[ValueType]| {
            types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(", ")
        };
        write!(f, "({}) -> ", join(&self.parameters))?;
        if self.return_types.is_empty() {
            write!(f, "nil")
        } else {
            write!(f, "{}", join(&self.return_types))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    pub fn decode(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        match cursor.read_u8()? {
            0 => Ok(Limits {
                min: cursor.read_vu32()?,
                max: None,
            }),
            1 => Ok(Limits {
                min: cursor.read_vu32()?,
                max: Some(cursor.read_vu32()?),
            }),
            flag => Err(DecodeError::InvalidLimitsFlag(flag)),
        }
    }
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "min = {}, max = {}", self.min, max),
            None => write!(f, "min = {}", self.min),
        }
    }
}

/// funcref table, the only element type in the MVP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub limits: Limits,
}

impl TableType {
    fn decode(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        let elem_type = cursor.read_u8()?;
        if elem_type != FUNCREF {
            return Err(DecodeError::InvalidElementType(elem_type));
        }
        Ok(TableType {
            limits: Limits::decode(cursor)?,
        })
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "funcref {}", self.limits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool, // const or var
}

impl GlobalType {
    fn decode(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        let value_type = ValueType::read(cursor)?;
        let mutable = match cursor.read_u8()? {
            0 => false,
            1 => true,
            flag => return Err(DecodeError::InvalidMutability(flag)),
        };
        Ok(GlobalType { value_type, mutable })
    }
}

impl fmt::Display for GlobalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.value_type,
            if self.mutable { "var" } else { "const" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalKind {
    Function(u32), // typeidx
    Table(TableType),
    Memory(Limits),
    Global(GlobalType),
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExternalKind::Function(typeidx) => write!(f, "Function({})", typeidx),
            ExternalKind::Table(table_type) => write!(f, "Table({})", table_type),
            ExternalKind::Memory(limits) => write!(f, "Memory({})", limits),
            ExternalKind::Global(global_type) => write!(f, "Global({})", global_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub external_kind: ExternalKind,
}

impl Import {
    fn decode(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        let module = cursor.read_string()?;
        let name = cursor.read_string()?;
        let external_kind = match cursor.read_u8()? {
            0 => ExternalKind::Function(cursor.read_vu32()?),
            1 => ExternalKind::Table(TableType::decode(cursor)?),
            2 => ExternalKind::Memory(Limits::decode(cursor)?),
            3 => ExternalKind::Global(GlobalType::decode(cursor)?),
            kind => return Err(DecodeError::InvalidImportKind(kind)),
        };
        Ok(Import {
            module,
            name,
            external_kind,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportIndex {
    Function(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

impl ExportIndex {
    pub fn decode(kind: u8, index: u32) -> Result<Self, DecodeError> {
        match kind {
            0 => Ok(ExportIndex::Function(index)),
            1 => Ok(ExportIndex::Table(index)),
            2 => Ok(ExportIndex::Memory(index)),
            3 => Ok(ExportIndex::Global(index)),
            _ => Err(DecodeError::InvalidExportKind(kind)),
        }
    }
}

impl fmt::Display for ExportIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExportIndex::Function(i) => write!(f, "func {}", i),
            ExportIndex::Table(i) => write!(f, "table {}", i),
            ExportIndex::Memory(i) => write!(f, "memory {}", i),
            ExportIndex::Global(i) => write!(f, "global {}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub index: ExportIndex,
}

impl Export {
    fn decode(cursor: &mut ByteCursor) -> Result<Self, DecodeError> {
        let name = cursor.read_string()?;
        let kind = cursor.read_u8()?;
        let index = ExportIndex::decode(kind, cursor.read_vu32()?)?;
        Ok(Export { name, index })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub global_type: GlobalType,
    pub init: Span,
}

impl Global {
    fn decode(cursor: &mut ByteCursor, pool: &mut InstructionPool) -> Result<Self, DecodeError> {
        let global_type = GlobalType::decode(cursor)?;
        let init = pool.read_expression(cursor)?;
        Ok(Global { global_type, init })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub table_index: u32,
    pub offset: Span,
    pub init: Vec<u32>,
}

impl Element {
    fn decode(cursor: &mut ByteCursor, pool: &mut InstructionPool) -> Result<Self, DecodeError> {
        let table_index = cursor.read_vu32()?;
        let offset = pool.read_expression(cursor)?;
        let init = cursor.read_vec(|c| c.read_vu32())?;
        Ok(Element {
            table_index,
            offset,
            init,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub memory_index: u32,
    pub offset: Span,
    pub init: Vec<u8>,
}

impl Data {
    fn decode(cursor: &mut ByteCursor, pool: &mut InstructionPool) -> Result<Self, DecodeError> {
        let memory_index = cursor.read_vu32()?;
        let offset = pool.read_expression(cursor)?;
        let init = cursor.read_u8vec()?.to_vec();
        Ok(Data {
            memory_index,
            offset,
            init,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locals {
    entries: Vec<(u32, ValueType)>,
}

impl Locals {
    // Initialize with a list of count+ValueType pairs
    pub fn new(entries: Vec<(u32, ValueType)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> u64 {
        self.entries.iter().map(|(count, _)| *count as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (u32, ValueType)> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody {
    pub locals: Locals,
    pub body: Span,
}

impl FunctionBody {
    fn decode(cursor: &mut ByteCursor, pool: &mut InstructionPool) -> Result<Self, DecodeError> {
        let size = cursor.read_vu32()?;
        let mut entry = cursor.sub_cursor(size as usize)?;
        let locals = Locals::new(entry.read_vec(|c| Ok((c.read_vu32()?, ValueType::read(c)?)))?);
        let body = pool.read_expression(&mut entry)?;
        if !entry.is_empty() {
            return Err(DecodeError::SectionSizeMismatch {
                id: SECTION_CODE,
                remaining: entry.remaining(),
            });
        }
        Ok(FunctionBody { locals, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::opcode::OpCode;
    use crate::parser::parse;

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    fn module_with(sections: &[u8]) -> Vec<u8> {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(sections);
        bytes
    }

    #[test]
    fn empty_module() {
        let module = parse(&HEADER).expect("empty module should parse");
        assert_eq!(module.magic, MAGIC);
        assert_eq!(module.version, VERSION);
        assert!(module.types.is_empty());
        assert_eq!(module.start, None);
    }

    #[test]
    fn bad_header() {
        assert_eq!(
            parse(&[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00]).unwrap_err(),
            DecodeError::BadHeader {
                magic: 0x6e736100,
                version: 0
            }
        );
        assert_eq!(
            parse(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00]).unwrap_err(),
            DecodeError::BadHeader {
                magic: MAGIC,
                version: 2
            }
        );
        assert!(matches!(parse(&[0x00, 0x61]), Err(DecodeError::BadHeader { .. })));
    }

    #[test]
    fn unknown_section() {
        assert_eq!(
            parse(&module_with(&[0x0c, 0x00])).unwrap_err(),
            DecodeError::UnknownSection(12)
        );
    }

    #[test]
    fn truncated_section() {
        assert!(matches!(
            parse(&module_with(&[0x01, 0x05, 0x01])),
            Err(DecodeError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn section_size_mismatch() {
        // type section holds an empty vector plus one stray byte
        let bytes = module_with(&[0x01, 0x02, 0x00, 0xff]);
        assert_eq!(
            parse(&bytes).unwrap_err(),
            DecodeError::SectionSizeMismatch { id: 1, remaining: 1 }
        );
    }

    #[test]
    fn add_module() {
        let bytes = module_with(&[
            0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f, // type (i32, i32) -> i32
            0x03, 0x02, 0x01, 0x00, // function 0 has type 0
            0x07, 0x07, 0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00, // export "add"
            0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b, // code
        ]);
        let module = parse(&bytes).expect("add module should parse");
        assert_eq!(
            module.types,
            vec![FunctionType::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32])]
        );
        assert_eq!(module.functions, vec![0]);
        assert_eq!(module.export("add").map(|e| e.index), Some(ExportIndex::Function(0)));
        assert_eq!(module.get_function_name(0), Some(&"add".to_string()));
        assert_eq!(module.function_type(0).map(|t| t.result()), Some(Some(ValueType::I32)));

        let body = module.code[0].body;
        assert!(module.code[0].locals.is_empty());
        let ops: Vec<OpCode> = (0..body.len)
            .map(|i| module.pool.opcode(module.pool.instruction_at(body, i).unwrap()).unwrap())
            .collect();
        assert_eq!(ops, vec![OpCode::LocalGet, OpCode::LocalGet, OpCode::I32Add]);
    }

    #[test]
    fn imports_tables_memories_globals() {
        let bytes = module_with(&[
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type () -> nil
            // import env.f func type 0, env.m memory min 1
            0x02, 0x12, 0x02, 0x03, b'e', b'n', b'v', 0x01, b'f', 0x00, 0x00, 0x03, b'e', b'n',
            b'v', 0x01, b'm', 0x02, 0x00, 0x01,
            0x04, 0x05, 0x01, 0x70, 0x01, 0x02, 0x0a, // table funcref min 2 max 10
            0x05, 0x04, 0x01, 0x01, 0x01, 0x02, // memory min 1 max 2
            0x06, 0x06, 0x01, 0x7e, 0x01, 0x42, 0x2a, 0x0b, // global mut i64 = 42
            0x08, 0x01, 0x00, // start 0
        ]);
        let module = parse(&bytes).expect("module should parse");
        assert_eq!(module.imports.len(), 2);
        assert_eq!(module.imports[0].external_kind, ExternalKind::Function(0));
        assert_eq!(
            module.imports[1].external_kind,
            ExternalKind::Memory(Limits { min: 1, max: None })
        );
        assert_eq!(module.imported_function_count(), 1);
        assert_eq!(module.function_type_index(0), Some(0));
        assert_eq!(module.function_type_index(1), None);
        assert_eq!(
            module.tables,
            vec![TableType {
                limits: Limits { min: 2, max: Some(10) }
            }]
        );
        assert_eq!(module.memories, vec![Limits { min: 1, max: Some(2) }]);
        assert_eq!(module.globals.len(), 1);
        assert!(module.globals[0].global_type.mutable);
        let init = module.globals[0].init;
        let konst = module.pool.instruction_at(init, 0).unwrap();
        assert_eq!(module.pool.operand(konst, 0).unwrap(), 42);
        assert_eq!(module.start, Some(0));
    }

    #[test]
    fn elements_and_data() {
        let bytes = module_with(&[
            0x09, 0x07, 0x01, 0x00, 0x41, 0x01, 0x0b, 0x01, 0x00, // elem table 0 offset 1 [0]
            0x0b, 0x08, 0x01, 0x00, 0x41, 0x10, 0x0b, 0x02, 0xaa, 0xbb, // data offset 16
        ]);
        let module = parse(&bytes).expect("module should parse");
        assert_eq!(module.elements[0].init, vec![0]);
        assert_eq!(module.data[0].init, vec![0xaa, 0xbb]);
        let offset = module.pool.instruction_at(module.data[0].offset, 0).unwrap();
        assert_eq!(module.pool.opcode(offset).unwrap(), OpCode::I32Const);
        assert_eq!(module.pool.operand(offset, 0).unwrap(), 16);
    }

    #[test]
    fn duplicate_sections_last_wins_and_custom_accumulates() {
        let bytes = module_with(&[
            0x00, 0x04, 0x01, b'a', 0x01, 0x02, // custom "a" [1, 2]
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type () -> nil
            0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7c, // type () -> f64
            0x00, 0x02, 0x01, b'b', // custom "b" []
        ]);
        let module = parse(&bytes).expect("module should parse");
        assert_eq!(module.types, vec![FunctionType::new(vec![], vec![ValueType::F64])]);
        assert_eq!(
            module.custom,
            vec![
                CustomSection {
                    name: "a".to_string(),
                    data: vec![1, 2]
                },
                CustomSection {
                    name: "b".to_string(),
                    data: vec![]
                },
            ]
        );
    }

    #[test]
    fn malformed_entries() {
        let err = |sections: &[u8]| parse(&module_with(sections)).unwrap_err();

        assert_eq!(err(&[0x01, 0x03, 0x01, 0x61, 0x00]), DecodeError::InvalidTypeForm(0x61));
        assert_eq!(err(&[0x01, 0x04, 0x01, 0x60, 0x01, 0x7b]), DecodeError::InvalidValueType(0x7b));
        assert_eq!(err(&[0x05, 0x03, 0x01, 0x02, 0x00]), DecodeError::InvalidLimitsFlag(0x02));
        assert_eq!(err(&[0x04, 0x04, 0x01, 0x6f, 0x00, 0x00]), DecodeError::InvalidElementType(0x6f));
        assert_eq!(err(&[0x07, 0x04, 0x01, 0x00, 0x04, 0x00]), DecodeError::InvalidExportKind(0x04));
        assert_eq!(
            err(&[0x02, 0x06, 0x01, 0x00, 0x00, 0x04, 0x00, 0x00]),
            DecodeError::InvalidImportKind(0x04)
        );
        assert_eq!(
            err(&[0x06, 0x06, 0x01, 0x7f, 0x02, 0x41, 0x00, 0x0b]),
            DecodeError::InvalidMutability(0x02)
        );
        assert_eq!(
            err(&[0x03, 0x02, 0x01, 0x00]),
            DecodeError::FunctionCountMismatch {
                functions: 1,
                bodies: 0
            }
        );
    }

    #[test]
    fn display_summary() {
        let bytes = module_with(&[0x01, 0x05, 0x01, 0x60, 0x01, 0x7f, 0x00]);
        let module = parse(&bytes).unwrap();
        assert_eq!(
            module.to_string(),
            "magic = 0x6d736100 version = 1\ntype[0] (i32) -> nil\n"
        );
    }
}

#[cfg(test)]
mod tests {
    use lotus::parser::module::{ExportIndex, ValueType};
    use lotus::parser::reader::ByteCursor;
    use lotus::parser::{self, DecodeError, OpCode};
    use rand::Rng;
    use rstest::rstest;

    #[rstest]
    #[case("08", 8)]
    #[case("807f", 16256)]
    #[case("808080fd07", 2141192192)]
    #[case("ffffffff0f", u32::MAX)]
    fn test_read_vu32(#[case] bytes: &str, #[case] expected: u32) {
        let bytes = hex::decode(bytes).unwrap();
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(cursor.read_vu32(), Ok(expected));
        assert!(cursor.is_empty());
    }

    #[rstest]
    #[case("8080808078", i32::MIN)]
    #[case("ffffffff07", i32::MAX)]
    #[case("7f", -1)]
    #[case("3f", 63)]
    #[case("c000", 64)]
    fn test_read_vs32(#[case] bytes: &str, #[case] expected: i32) {
        let bytes = hex::decode(bytes).unwrap();
        assert_eq!(ByteCursor::new(&bytes).read_vs32(), Ok(expected));
    }

    #[rstest]
    #[case("ffffffff1f", DecodeError::Overflow(32))]
    #[case("8080808080", DecodeError::InvalidLeb128)]
    #[case("80", DecodeError::UnexpectedEof(1))]
    fn test_read_vu32_errors(#[case] bytes: &str, #[case] expected: DecodeError) {
        let bytes = hex::decode(bytes).unwrap();
        assert_eq!(ByteCursor::new(&bytes).read_vu32(), Err(expected));
    }

    #[test]
    fn test_leb128_random_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let (u, s): (u64, i64) = (rng.gen(), rng.gen());
            let mut bytes = parser::reader::emit_vu64(u);
            bytes.extend(parser::reader::emit_vs64(s));
            let mut cursor = ByteCursor::new(&bytes);
            assert_eq!(cursor.read_vu64(), Ok(u));
            assert_eq!(cursor.read_vs64(), Ok(s));
            assert!(cursor.is_empty());
        }
    }

    #[rstest]
    #[case("", DecodeError::BadHeader { magic: 0, version: 0 })]
    #[case("0061736d02000000", DecodeError::BadHeader { magic: 0x6d736100, version: 2 })]
    #[case("0061736d010000000c00", DecodeError::UnknownSection(12))]
    #[case("0061736d0100000001020000", DecodeError::SectionSizeMismatch { id: 1, remaining: 1 })]
    #[case("0061736d0100", DecodeError::BadHeader { magic: 0x6d736100, version: 0 })]
    fn test_decode_errors(#[case] module: &str, #[case] expected: DecodeError) {
        let bytes = hex::decode(module).unwrap();
        assert_eq!(parser::parse(&bytes).err(), Some(expected));
    }

    #[rstest]
    #[case("0061736d0100000001040160000003020100", DecodeError::FunctionCountMismatch { functions: 1, bodies: 0 })]
    #[case("0061736d01000000010401600000030201000a05010300ff0b", DecodeError::UnknownOpcode(0xff))]
    #[case("0061736d01000000010401600000030201000a05010300050b", DecodeError::UnexpectedDelimiter("else"))]
    #[case("0061736d01000000010401600000030201000a050103000b0b", DecodeError::SectionSizeMismatch { id: 10, remaining: 1 })]
    fn test_malformed_code(#[case] module: &str, #[case] expected: DecodeError) {
        let bytes = hex::decode(module).unwrap();
        assert_eq!(parser::parse(&bytes).err(), Some(expected));
    }

    #[test]
    fn test_add_module_sections() {
        let bytes =
            hex::decode("0061736d0100000001070160027f7f017f030201000707010361646400000a09010700200020016a0b")
                .unwrap();
        let module = parser::parse(&bytes).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.types[0].parameters, vec![ValueType::I32, ValueType::I32]);
        assert_eq!(module.types[0].result(), Some(ValueType::I32));
        assert_eq!(module.export("add").map(|e| e.index), Some(ExportIndex::Function(0)));

        let body = module.pool.to_instructions(module.code[0].body).unwrap();
        let ops: Vec<OpCode> = body.iter().map(|i| i.op).collect();
        assert_eq!(ops, vec![OpCode::LocalGet, OpCode::LocalGet, OpCode::I32Add]);
        assert_eq!(body[1].operands, vec![1]);
    }

    /// `() -> ()` function 0 exported as "f", with `body` (locals included) as its code
    fn single_function_module(body: &[u8]) -> Vec<u8> {
        let mut bytes = hex::decode("0061736d010000000104016000000302010007050101660000").unwrap();
        let mut entry = parser::reader::emit_vu32(body.len() as u32);
        entry.extend_from_slice(body);
        let mut payload = parser::reader::emit_vu32(1);
        payload.extend(entry);
        bytes.push(0x0a);
        bytes.extend(parser::reader::emit_vu32(payload.len() as u32));
        bytes.extend(payload);
        bytes
    }

    #[test]
    fn test_deeply_nested_blocks_parse() {
        let depth = 20_000;
        let mut body = vec![0x00];
        for _ in 0..depth {
            body.extend([0x02, 0x40]);
        }
        body.extend(std::iter::repeat(0x0b).take(depth + 1));

        let module = parser::parse(&single_function_module(&body)).unwrap();
        assert_eq!(module.code.len(), 1);
        assert_eq!(module.code[0].body.len, 1);
        assert_eq!(
            module.pool.to_instructions(module.code[0].body),
            Err(DecodeError::NestingTooDeep(parser::pool::MAX_TREE_DEPTH))
        );
    }

    #[test]
    fn test_unterminated_nesting() {
        let mut body = vec![0x00];
        for _ in 0..1000 {
            body.extend([0x02, 0x40]);
        }
        body.extend(std::iter::repeat(0x0b).take(500));
        assert!(matches!(
            parser::parse(&single_function_module(&body)),
            Err(DecodeError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn test_nested_disassembly() {
        // (func (result i64) (param i64) fac)
        let bytes = hex::decode(concat!(
            "0061736d0100000001060160017e017e030201000707010366616300000a1901170020004201",
            "57047e4201052000200042017d10007e0b0b",
        ))
        .unwrap();
        let module = parser::parse(&bytes).unwrap();
        let listing: String = module
            .pool
            .to_instructions(module.code[0].body)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            listing,
            concat!(
                "local.get 0\n",
                "i64.const 1\n",
                "i64.le_s\n",
                "if (result i64)\n",
                "  i64.const 1\n",
                "else\n",
                "  local.get 0\n",
                "  local.get 0\n",
                "  i64.const 1\n",
                "  i64.sub\n",
                "  call 0\n",
                "  i64.mul\n",
                "end\n",
            )
        );
    }
}

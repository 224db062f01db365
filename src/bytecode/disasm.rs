use std::collections::BTreeSet;
use std::fmt::Write;

use crate::bytecode::code::{ByteCode, CodeError};
use crate::bytecode::op::Instr;

/// Decodes every instruction with its address.
pub fn decode_all(code: &ByteCode) -> Result<Vec<(usize, Instr)>, CodeError> {
    let mut cursor = ByteCode::new(code.as_bytes().to_vec());
    let mut out = Vec::new();

    loop {
        let addr = cursor.position();
        match Instr::decode(&mut cursor) {
            Ok(instr) => out.push((addr, instr)),
            Err(CodeError::EndOfData) => return Ok(out),
            Err(e) => return Err(e),
        }
    }
}

/// Print disassembly of a bytecode program
pub fn print_bc(code: &ByteCode) {
    print!("{}", disassemble(code));
}

/// Render a listing, one instruction per line.
///
/// Jump targets and function entries get a `►` marker. Undecodable bytes end
/// the listing with an `error:` line.
pub fn disassemble(code: &ByteCode) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " main");
    let _ = writeln!(out, " {} bytes", code.len());
    let _ = writeln!(out, "════════════════════════════════════════");

    let (instrs, error) = match decode_all(code) {
        Ok(instrs) => (instrs, None),
        Err(e) => (decode_prefix(code), Some(e)),
    };

    let targets = collect_jump_targets(&instrs);
    for (addr, instr) in &instrs {
        let marker = if targets.contains(addr) { "► " } else { "  " };
        let _ = writeln!(out, "{:04} {}{}", addr, marker, instr);
    }

    if let Some(e) = error {
        let _ = writeln!(out, "error: {}", e);
    }

    out
}

/// Decodes up to the first malformed instruction.
fn decode_prefix(code: &ByteCode) -> Vec<(usize, Instr)> {
    let mut cursor = ByteCode::new(code.as_bytes().to_vec());
    let mut out = Vec::new();
    loop {
        let addr = cursor.position();
        match Instr::decode(&mut cursor) {
            Ok(instr) => out.push((addr, instr)),
            Err(_) => return out,
        }
    }
}

fn collect_jump_targets(instrs: &[(usize, Instr)]) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();

    for (i, (_, instr)) in instrs.iter().enumerate() {
        match instr {
            Instr::Jump(target) => {
                targets.insert(*target);
            }
            // `pushi entry; jump end` is how function literals are laid out
            Instr::PushInt(entry) => {
                if let Some((_, Instr::Jump(_))) = instrs.get(i + 1) {
                    if let Ok(entry) = usize::try_from(*entry) {
                        targets.insert(entry);
                    }
                }
            }
            _ => {}
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;

    #[test]
    fn test_disassemble_expression() {
        let code = Compiler::new("1 + 2").compile().unwrap();
        let listing = disassemble(&code);
        let body: Vec<&str> = listing.lines().skip(4).collect();
        assert_eq!(
            body,
            vec!["0000   pushi  1", "0009   pushi  2", "0018   addi"]
        );
    }

    #[test]
    fn test_disassemble_marks_function_entry() {
        let code = Compiler::new("func(a) { a }").compile().unwrap();
        let listing = disassemble(&code);
        assert!(listing.contains("0018 ► get    fp+0"));
        assert!(listing.contains("0027   ret"));
        assert!(listing.contains("0009   jump   0028"));
        assert!(!listing.contains("0028 ►"));
    }

    #[test]
    fn test_disassemble_reports_bad_bytes() {
        let code = ByteCode::new(vec![4, 200]);
        let listing = disassemble(&code);
        assert!(listing.contains("0000   dup"));
        assert!(listing.contains("error: unknown opcode 0xc8 at 1"));
    }
}

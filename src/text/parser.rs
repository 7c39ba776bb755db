//! Parser for the textual DAG format.

use super::Module;
use crate::core::error::ParseError;
use crate::dag::{
    sync_scope, AsmInfo, AtomicOrdering, Dag, GenericOp, GlobalRef, NodeFlags, NodeId, Payload,
    SdValue, TlsModel, ValueType,
};
use crate::isel::constraint::{AsmOperandKind, ConstraintCode};
use crate::isel::Target;
use hashbrown::HashMap;

pub fn parse_module(text: &str, target: &dyn Target) -> Result<Module> {
    Parser::new(text, target).parse()
}

type Result<T> = std::result::Result<T, ParseError>;

struct Parser<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    target: &'a dyn Target,
    line: usize,

    // Per-function state
    dag: Option<Dag>,
    values: HashMap<&'a str, NodeId>,
    last: Option<NodeId>,
}

/// Remove a trailing `;` comment that is not inside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// Split an operand list on commas outside string literals.
fn split_operands(rest: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            ',' if !in_string => {
                parts.push(rest[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let tail = rest[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, target: &'a dyn Target) -> Self {
        Self {
            lines: text.lines().enumerate(),
            target,
            line: 0,
            dag: None,
            values: HashMap::new(),
            last: None,
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(ParseError::new(self.line, message))
    }

    fn parse(mut self) -> Result<Module> {
        let mut module = Module::default();
        while let Some((idx, raw)) = self.lines.next() {
            self.line = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if self.dag.is_none() {
                let Some(header) = line.strip_prefix("define") else {
                    return self.error(format!("expected 'define', found '{line}'"));
                };
                let Some(name) = header.trim().strip_suffix('{').map(str::trim) else {
                    return self.error("expected '{' after function name");
                };
                let Some(name) = name.strip_prefix('@').filter(|n| !n.is_empty()) else {
                    return self.error(format!("expected @name, found '{name}'"));
                };
                if module.functions.iter().any(|f| f.name() == name) {
                    return self.error(format!("duplicate function '@{name}'"));
                }
                self.begin_function(name);
                continue;
            }

            if line == "}" {
                module.functions.push(self.end_function()?);
                continue;
            }
            self.parse_statement(line)?;
        }

        if self.dag.is_some() {
            return self.error("unterminated function body");
        }
        Ok(module)
    }

    fn begin_function(&mut self, name: &str) {
        let dag = Dag::new(name);
        self.values.clear();
        self.values.insert("entry", dag.entry_token().node);
        self.last = None;
        self.dag = Some(dag);
    }

    fn end_function(&mut self) -> Result<Dag> {
        let Some(mut dag) = self.dag.take() else {
            return self.error("'}' outside a function");
        };
        let Some(root) = self.last else {
            return self.error(format!("function '@{}' has an empty body", dag.name()));
        };
        dag.set_root(root);
        Ok(dag)
    }

    fn dag(&mut self) -> &mut Dag {
        match self.dag.as_mut() {
            Some(dag) => dag,
            None => unreachable!("statements are only parsed inside a function"),
        }
    }

    fn parse_statement(&mut self, line: &'a str) -> Result<()> {
        let (def, body) = match line.split_once('=') {
            Some((lhs, rhs)) if lhs.trim().starts_with('%') && !lhs.contains('"') => {
                (Some(lhs.trim()[1..].trim()), rhs.trim())
            }
            _ => (None, line),
        };
        if let Some(name) = def {
            if name.is_empty() || name.contains(':') {
                return self.error(format!("invalid value name '%{name}'"));
            }
            if self.values.contains_key(name) {
                return self.error(format!("redefinition of '%{name}'"));
            }
        }

        let (head, rest) = body
            .split_once(char::is_whitespace)
            .map(|(h, r)| (h, r.trim()))
            .unwrap_or((body, ""));
        let mut parts = head.split('.');
        let mnemonic = parts.next().unwrap_or_default();
        let types = parts
            .map(|name| ValueType::from_name(name).ok_or(name))
            .collect::<std::result::Result<Vec<_>, _>>();
        let types = match types {
            Ok(types) => types,
            Err(name) => return self.error(format!("unknown type '{name}'")),
        };

        let id = match GenericOp::from_name(mnemonic) {
            Some(op) => self.parse_generic(op, &types, rest)?,
            None => match self.target.machine_opcode(mnemonic) {
                Some(op) => {
                    let operands = self.parse_value_list(split_operands(rest))?;
                    self.dag().get_machine_node(op, &types, &operands)
                }
                None => return self.error(format!("unknown operation '{mnemonic}'")),
            },
        };

        if let Some(name) = def {
            self.values.insert(name, id);
        }
        self.last = Some(id);
        Ok(())
    }

    fn single_type(&self, op: GenericOp, types: &[ValueType]) -> Result<ValueType> {
        match types {
            [ty] if !ty.is_chain() => Ok(*ty),
            _ => self.error(format!("'{op}' needs one value type suffix")),
        }
    }

    fn parse_generic(
        &mut self,
        op: GenericOp,
        types: &[ValueType],
        rest: &'a str,
    ) -> Result<NodeId> {
        use GenericOp::*;
        match op {
            Argument | Constant => {
                let ty = self.single_type(op, types)?;
                let value = self.parse_int(rest)?;
                Ok(self.dag().get_node(op, &[ty], &[], Payload::Imm(value)))
            }
            ConstantFP => {
                let ty = self.single_type(op, types)?;
                let value: f64 = match rest.parse() {
                    Ok(value) => value,
                    Err(_) => return self.error(format!("invalid float '{rest}'")),
                };
                let bits = match ty {
                    ValueType::F32 => (value as f32).to_bits() as u64,
                    _ => value.to_bits(),
                };
                Ok(self.dag().get_node(op, &[ty], &[], Payload::FpBits(bits)))
            }
            _ if op.is_binary() => {
                let ty = self.single_type(op, types)?;
                let (flags, rest) = match rest.strip_prefix("nuw") {
                    Some(tail) if tail.starts_with(char::is_whitespace) => {
                        (NodeFlags { nuw: true }, tail.trim())
                    }
                    _ => (NodeFlags::default(), rest),
                };
                let operands = self.parse_value_list(split_operands(rest))?;
                if operands.len() != 2 {
                    return self.error(format!("'{op}' takes two operands"));
                }
                Ok(self.dag().get_node_with_flags(op, &[ty], &operands, Payload::None, flags))
            }
            Load => {
                let ty = self.single_type(op, types)?;
                let operands = self.parse_value_list(split_operands(rest))?;
                if operands.len() != 2 {
                    return self.error("'load' takes a chain and an address");
                }
                Ok(self.dag().get_node(op, &[ty, ValueType::Chain], &operands, Payload::None))
            }
            Store => {
                let operands = self.parse_value_list(split_operands(rest))?;
                if operands.len() != 3 {
                    return self.error("'store' takes a chain, a value and an address");
                }
                Ok(self.dag().get_node(op, &[ValueType::Chain], &operands, Payload::None))
            }
            AtomicFence => {
                let parts = split_operands(rest);
                let [chain, ordering, scope] = parts.as_slice() else {
                    return self.error("'fence' takes a chain, an ordering and a scope");
                };
                let chain = self.parse_value(chain)?;
                let Some(ordering) = AtomicOrdering::from_name(ordering) else {
                    return self.error(format!("unknown ordering '{ordering}'"));
                };
                let scope = match *scope {
                    "singlethread" => sync_scope::SINGLE_THREAD,
                    "system" => sync_scope::SYSTEM,
                    other => self.parse_int(other)?,
                };
                let dag = self.dag();
                let ordering = dag.get_target_constant(ordering.encoding(), ValueType::I32);
                let scope = dag.get_target_constant(scope, ValueType::I32);
                Ok(dag.get_node(op, &[ValueType::Chain], &[chain, ordering, scope], Payload::None))
            }
            GlobalAddress | GlobalTlsAddress => {
                let ty = self.single_type(op, types)?;
                let (symbol, model) = rest
                    .split_once(char::is_whitespace)
                    .map(|(s, m)| (s, Some(m.trim())))
                    .unwrap_or((rest, None));
                let tls_model = match model {
                    None => TlsModel::default(),
                    Some(name) if op == GlobalTlsAddress => match TlsModel::from_name(name) {
                        Some(model) => model,
                        None => return self.error(format!("unknown TLS model '{name}'")),
                    },
                    Some(extra) => return self.error(format!("unexpected '{extra}'")),
                };
                let global = self.parse_global(symbol, tls_model)?;
                Ok(self.dag().get_node(op, &[ty], &[], Payload::Global(global)))
            }
            IntrinsicWoChain | IntrinsicWChain => {
                let ty = self.single_type(op, types)?;
                let mut parts = split_operands(rest).into_iter();
                let chain = if op == IntrinsicWChain {
                    let Some(chain) = parts.next() else {
                        return self.error("'intrinsic_chain' needs a chain operand");
                    };
                    Some(self.parse_value(chain)?)
                } else {
                    None
                };
                let Some(name) = parts.next() else {
                    return self.error("missing intrinsic name");
                };
                let Some(intrinsic) = self.target.intrinsic_id(name) else {
                    return self.error(format!("unknown intrinsic '{name}'"));
                };
                let args = self.parse_value_list(parts.collect())?;

                let dag = self.dag();
                let mut operands: Vec<SdValue> = chain.into_iter().collect();
                operands.push(dag.get_target_constant(intrinsic, ValueType::I32));
                operands.extend(args);
                let mut results = vec![ty];
                if chain.is_some() {
                    results.push(ValueType::Chain);
                }
                Ok(dag.get_node(op, &results, &operands, Payload::None))
            }
            InlineAsm => {
                let mut parts = split_operands(rest).into_iter();
                let (Some(chain), Some(template)) = (parts.next(), parts.next()) else {
                    return self.error("'asm' takes a chain and a template");
                };
                let chain = self.parse_value(chain)?;
                let Some(template) = template
                    .strip_prefix('"')
                    .and_then(|t| t.strip_suffix('"'))
                else {
                    return self.error(format!("expected quoted template, found '{template}'"));
                };

                let mut kinds = Vec::new();
                let mut operands = vec![chain];
                for part in parts {
                    let Some((kind, value)) = part.split_once(char::is_whitespace) else {
                        return self
                            .error(format!("expected '<constraint> %value', found '{part}'"));
                    };
                    kinds.push(self.parse_constraint(kind)?);
                    operands.push(self.parse_value(value.trim())?);
                }

                let dag = self.dag();
                let asm = dag.add_asm(AsmInfo {
                    template: template.to_string(),
                    operands: kinds,
                });
                Ok(dag.get_node(op, &[ValueType::Chain], &operands, Payload::Asm(asm)))
            }
            Return => {
                let operands = self.parse_value_list(split_operands(rest))?;
                if operands.is_empty() {
                    return self.error("'ret' needs a chain operand");
                }
                Ok(self.dag().get_node(op, &[], &operands, Payload::None))
            }
            _ => self.error(format!("operation '{op}' cannot be written directly")),
        }
    }

    fn parse_constraint(&self, kind: &str) -> Result<AsmOperandKind> {
        match kind {
            "r" => Ok(AsmOperandKind::Register),
            "n" => Ok(AsmOperandKind::Immediate),
            _ => {
                let mut chars = kind.chars();
                match (chars.next().and_then(ConstraintCode::from_letter), chars.next()) {
                    (Some(code), None) => Ok(AsmOperandKind::Memory(code)),
                    _ => self.error(format!("unknown constraint '{kind}'")),
                }
            }
        }
    }

    fn parse_int(&self, text: &str) -> Result<i64> {
        let text = text.trim();
        let parsed = match text.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => text.parse(),
        };
        match parsed {
            Ok(value) => Ok(value),
            Err(_) => self.error(format!("invalid integer '{text}'")),
        }
    }

    fn parse_global(&mut self, text: &str, tls_model: TlsModel) -> Result<GlobalRef> {
        let Some(text) = text.strip_prefix('@') else {
            return self.error(format!("expected @symbol, found '{text}'"));
        };
        let (name, offset) = match text.find(|c| c == '+' || c == '-') {
            Some(idx) => (&text[..idx], self.parse_int(&text[idx..])?),
            None => (text, 0),
        };
        if name.is_empty() {
            return self.error("empty symbol name");
        }
        let symbol = self.dag().intern(name);
        Ok(GlobalRef {
            symbol,
            offset,
            tls_model,
        })
    }

    fn parse_value_list(&mut self, parts: Vec<&str>) -> Result<Vec<SdValue>> {
        parts.into_iter().map(|part| self.parse_value(part)).collect()
    }

    /// `%name`, `%name:N` or `$imm`.
    fn parse_value(&mut self, text: &str) -> Result<SdValue> {
        if let Some(imm) = text.strip_prefix('$') {
            let value = self.parse_int(imm)?;
            return Ok(self.dag().get_target_constant(value, ValueType::I32));
        }
        let Some(name) = text.strip_prefix('%') else {
            return self.error(format!("expected a value, found '{text}'"));
        };
        let (name, result) = match name.split_once(':') {
            Some((name, idx)) => match idx.parse::<u32>() {
                Ok(idx) => (name, idx),
                Err(_) => return self.error(format!("invalid result index in '{text}'")),
            },
            None => (name, 0),
        };
        let Some(&node) = self.values.get(name) else {
            return self.error(format!("use of undefined value '%{name}'"));
        };
        let results = self.dag().get(node).map_or(0, |n| n.results.len());
        if result as usize >= results {
            return self.error(format!("'%{name}' has no result {result}"));
        }
        Ok(SdValue::new(node, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Opcode;
    use crate::wasm::WasmTarget;

    fn parse(text: &str) -> Result<Module> {
        parse_module(text, &WasmTarget::new())
    }

    #[test]
    fn parses_function_with_chain_and_flags() {
        let module = parse(
            "; leading comment\n\
             define @sum {\n\
               %a = arg.i32 0\n\
               %c = const.i32 16\n\
               %p = add.i32 nuw %a, %c\n\
               %l = load.i32 %entry, %p   ; value and chain\n\
               ret %l:1, %l\n\
             }\n",
        )
        .unwrap();
        assert_eq!(module.functions.len(), 1);
        let dag = &module.functions[0];
        assert_eq!(dag.name(), "sum");
        let root = dag.root().unwrap();
        assert_eq!(dag[root].opcode, Opcode::Generic(GenericOp::Return));
        let load = dag[root].operands[1].node;
        assert_eq!(dag[load].results, vec![ValueType::I32, ValueType::Chain]);
        let add = dag[load].operands[1].node;
        assert!(dag[add].flags.nuw);
    }

    #[test]
    fn parses_fence_tls_intrinsics_and_asm() {
        let module = parse(
            "define @f {\n\
               %t = tlsaddr.i32 @counter+8 initialexec\n\
               %fe = fence %entry, seq_cst, singlethread\n\
               %b = intrinsic_chain.i32 %fe, tls_base\n\
               %s = intrinsic.i32 tls_size\n\
               %x = asm %b:1, \"foo $0, $1\", m %t, r %s\n\
               ret %x\n\
             }\n",
        )
        .unwrap();
        let dag = &module.functions[0];
        let text = dag.to_string();
        assert!(text.contains("tlsaddr<@counter+8 initialexec>"), "{text}");
        assert!(text.contains("asm<\"foo $0, $1\" m, r>"), "{text}");
        assert!(text.contains("ch = fence"), "{text}");
    }

    #[test]
    fn parses_machine_nodes() {
        let module = parse(
            "define @done {\n\
               %c = CONST_I32.i32 $7\n\
               RETURN %entry, %c\n\
             }\n",
        )
        .unwrap();
        let dag = &module.functions[0];
        assert!(dag.node_ids().all(|id| dag[id].is_finalized()));
    }

    #[test]
    fn reports_line_numbers() {
        let err =
            parse("define @f {\n  %a = arg.i32 0\n  %b = add.i32 %a, %nope\n}\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("%nope"));

        let err = parse("define @f {\n  %a = frob.i32 0\n}\n").unwrap_err();
        assert_eq!(err.to_string(), "line 2: unknown operation 'frob'");

        let err = parse("define @f {\n  %a = arg.i32 0\n").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn rejects_unknown_constraints_and_intrinsics() {
        let err = parse("define @f {\n  %x = asm %entry, \"\", z %entry\n}\n").unwrap_err();
        assert!(err.message.contains("unknown constraint 'z'"));
        let err = parse("define @f {\n  %x = intrinsic.i32 warp\n}\n").unwrap_err();
        assert!(err.message.contains("unknown intrinsic 'warp'"));
    }
}

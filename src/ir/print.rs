//! Textual rendering of raised functions.

use super::*;
use std::fmt::Write as _;

impl Function {
    /// Printable reference to a value: `%name.N`, `%N` or a constant.
    pub fn value_ref(&self, id: ValueId) -> String {
        let data = self.value(id);
        match (&data.op, &data.name) {
            (Op::Const(v), _) if data.ty == Type::I1 => (*v != 0).to_string(),
            (Op::Const(v), _) => v.to_string(),
            (Op::SlotAddr(_), Some(name)) => format!("%{name}"),
            (_, Some(name)) => format!("%{name}.{}", id.0),
            (_, None) => format!("%{}", id.0),
        }
    }

    fn typed_ref(&self, id: ValueId) -> String {
        format!("{} {}", self.ty(id), self.value_ref(id))
    }

    fn render_inst(&self, id: ValueId) -> String {
        let data = self.value(id);
        let rhs = match &data.op {
            Op::Arg(idx) => format!("arg {idx}"),
            Op::Const(v) => format!("const {v}"),
            Op::Binary { op, lhs, rhs } => format!(
                "{} {}, {}",
                format!("{op:?}").to_ascii_lowercase(),
                self.typed_ref(*lhs),
                self.value_ref(*rhs)
            ),
            Op::Icmp { pred, lhs, rhs } => format!(
                "icmp {} {}, {}",
                format!("{pred:?}").to_ascii_lowercase(),
                self.typed_ref(*lhs),
                self.value_ref(*rhs)
            ),
            Op::Select {
                cond,
                if_true,
                if_false,
            } => format!(
                "select {}, {}, {}",
                self.typed_ref(*cond),
                self.typed_ref(*if_true),
                self.typed_ref(*if_false)
            ),
            Op::Cast { kind, value } => format!(
                "{} {} to {}",
                format!("{kind:?}").to_ascii_lowercase(),
                self.typed_ref(*value),
                data.ty
            ),
            Op::Overflow { op, lhs, rhs } => format!(
                "{}.overflow {}, {}",
                format!("{op:?}").to_ascii_lowercase(),
                self.typed_ref(*lhs),
                self.value_ref(*rhs)
            ),
            Op::FunnelShift { dir, hi, lo, amount } => format!(
                "fsh{} {}, {}, {}",
                match dir {
                    FunnelDir::Left => "l",
                    FunnelDir::Right => "r",
                },
                self.typed_ref(*hi),
                self.value_ref(*lo),
                self.value_ref(*amount)
            ),
            Op::SlotAddr(slot) => {
                let slot = self.slot(*slot);
                format!("slot {}, align {}, offset {}", slot.ty, slot.align, slot.offset)
            }
            Op::Load { slot } => format!("load {}, {}", data.ty, self.value_ref(self.slot(*slot).addr)),
            Op::Store { slot, value } => {
                return format!(
                    "store {}, {}",
                    self.typed_ref(*value),
                    self.value_ref(self.slot(*slot).addr)
                )
            }
            Op::Br { target } => return format!("br label %{}", self.block(*target).name),
            Op::CondBr {
                cond,
                if_true,
                if_false,
            } => {
                return format!(
                    "br {}, label %{}, label %{}",
                    self.typed_ref(*cond),
                    self.block(*if_true).name,
                    self.block(*if_false).name
                )
            }
            Op::Ret { value: Some(v) } => return format!("ret {}", self.typed_ref(*v)),
            Op::Ret { value: None } => return "ret void".to_string(),
        };
        format!("{} = {}", self.value_ref(id), rhs)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = String::new();
        for (idx, &arg) in self.args().iter().enumerate() {
            if idx > 0 {
                params.push_str(", ");
            }
            let _ = write!(params, "{}", self.typed_ref(arg));
        }
        writeln!(f, "define @{}({}) {{", self.name, params)?;
        for (block_id, block) in self.blocks() {
            writeln!(f, "{}:", block.name)?;
            if block_id == BlockId::ENTRY {
                for slot in self.slots() {
                    writeln!(f, "  {}", self.render_inst(slot.addr))?;
                }
            }
            for &inst in &block.insts {
                writeln!(f, "  {}", self.render_inst(inst))?;
            }
            if let Some(term) = block.terminator {
                writeln!(f, "  {}", self.render_inst(term))?;
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_merge_shape() {
        let mut func = Function::new("f", &[Type::I64], ["entry", "exit"]);
        let slot = func.alloc_slot(Type::I64, "rax-merge");
        let arg = func.arg(0).unwrap();
        func.store(BlockId(0), slot, arg);
        func.br(BlockId(0), BlockId(1));
        let v = func.load(BlockId(1), slot);
        func.set_name(v, "rax");
        func.ret(BlockId(1), Some(v));

        let text = func.to_string();
        assert!(text.contains("define @f(i64 %0)"), "{text}");
        assert!(text.contains("%rax-merge = slot i64, align 8, offset -8"), "{text}");
        assert!(text.contains("store i64 %0, %rax-merge"), "{text}");
        assert!(text.contains("%rax.4 = load i64, %rax-merge"), "{text}");
        assert!(text.contains("ret i64 %rax.4"), "{text}");
    }

    #[test]
    fn test_print_constants() {
        let mut func = Function::new("g", &[], ["entry"]);
        let t = func.const_bool(true);
        let c = func.const_int(Type::I8, 7);
        assert_eq!(func.value_ref(t), "true");
        assert_eq!(func.value_ref(c), "7");
    }
}

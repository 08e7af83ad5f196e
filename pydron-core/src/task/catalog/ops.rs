//! Binary and unary operators (spec §4.4): pure, failing only when the
//! operand types reject the operator.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOpCode {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOpCode {
    fn as_str(&self) -> &'static str {
        match self {
            BinOpCode::Add => "+",
            BinOpCode::Sub => "-",
            BinOpCode::Mul => "*",
            BinOpCode::Div => "/",
            BinOpCode::FloorDiv => "//",
            BinOpCode::Mod => "%",
            BinOpCode::Pow => "**",
            BinOpCode::Eq => "==",
            BinOpCode::Ne => "!=",
            BinOpCode::Lt => "<",
            BinOpCode::Le => "<=",
            BinOpCode::Gt => ">",
            BinOpCode::Ge => ">=",
            BinOpCode::And => "and",
            BinOpCode::Or => "or",
            BinOpCode::BitAnd => "&",
            BinOpCode::BitOr => "|",
            BinOpCode::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinOp {
    pub op: BinOpCode,
}

impl BinOp {
    pub fn new(op: BinOpCode) -> Self {
        Self { op }
    }

    fn numeric_pair(a: &Value, b: &Value) -> Option<(f64, f64, bool)> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Some((*x as f64, *y as f64, true)),
            (Value::Int(x), Value::Float(y)) => Some((*x as f64, *y, false)),
            (Value::Float(x), Value::Int(y)) => Some((*x, *y as f64, false)),
            (Value::Float(x), Value::Float(y)) => Some((*x, *y, false)),
            _ => None,
        }
    }

    fn apply(&self, a: &Value, b: &Value) -> TaskResult<Value> {
        use BinOpCode::*;
        match self.op {
            Eq => return Ok(Value::Bool(a == b)),
            Ne => return Ok(Value::Bool(a != b)),
            _ => {}
        }
        if let Some((x, y, both_int)) = Self::numeric_pair(a, b) {
            let result = match self.op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => {
                    if y == 0.0 {
                        return Err(TaskFailure::new("division by zero"));
                    }
                    return Ok(Value::Float(x / y));
                }
                FloorDiv => {
                    if y == 0.0 {
                        return Err(TaskFailure::new("division by zero"));
                    }
                    (x / y).floor()
                }
                Mod => {
                    if y == 0.0 {
                        return Err(TaskFailure::new("modulo by zero"));
                    }
                    x - y * (x / y).floor()
                }
                Pow => x.powf(y),
                Lt => return Ok(Value::Bool(x < y)),
                Le => return Ok(Value::Bool(x <= y)),
                Gt => return Ok(Value::Bool(x > y)),
                Ge => return Ok(Value::Bool(x >= y)),
                BitAnd | BitOr | BitXor if both_int => {
                    let (xi, yi) = (x as i64, y as i64);
                    return Ok(Value::Int(match self.op {
                        BitAnd => xi & yi,
                        BitOr => xi | yi,
                        BitXor => xi ^ yi,
                        _ => unreachable!(),
                    }));
                }
                And => return Ok(Value::Bool(a.truthy() && b.truthy())),
                Or => return Ok(Value::Bool(a.truthy() || b.truthy())),
                Eq | Ne | BitAnd | BitOr | BitXor => unreachable!("handled above"),
            };
            return Ok(if both_int && matches!(self.op, Add | Sub | Mul) {
                Value::Int(result as i64)
            } else {
                Value::Float(result)
            });
        }
        match (self.op, a, b) {
            (Add, Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{x}{y}"))),
            (Add, Value::List(x), Value::List(y)) => {
                let mut v = x.clone();
                v.extend(y.clone());
                Ok(Value::List(v))
            }
            (And, _, _) => Ok(Value::Bool(a.truthy() && b.truthy())),
            (Or, _, _) => Ok(Value::Bool(a.truthy() || b.truthy())),
            _ => Err(TaskFailure::new(format!(
                "operator {} not supported between {a:?} and {b:?}",
                self.op.as_str()
            ))),
        }
    }
}

impl Task for BinOp {
    fn kind(&self) -> &'static str {
        "BinOp"
    }

    fn input_ports(&self) -> Vec<String> {
        vec!["left".to_string(), "right".to_string()]
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let left = inputs.get("left").ok_or_else(|| TaskFailure::new("missing input 'left'"))?;
        let right = inputs.get("right").ok_or_else(|| TaskFailure::new("missing input 'right'"))?;
        let mut out = Outputs::new();
        out.insert("value".to_string(), self.apply(left, right)?);
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "op": self.op.as_str() })
    }

    fn quick(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOpCode {
    Neg,
    Pos,
    Not,
    Invert,
}

impl UnOpCode {
    fn as_str(&self) -> &'static str {
        match self {
            UnOpCode::Neg => "-",
            UnOpCode::Pos => "+",
            UnOpCode::Not => "not",
            UnOpCode::Invert => "~",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnOp {
    pub op: UnOpCode,
}

impl UnOp {
    pub fn new(op: UnOpCode) -> Self {
        Self { op }
    }
}

impl Task for UnOp {
    fn kind(&self) -> &'static str {
        "UnOp"
    }

    fn input_ports(&self) -> Vec<String> {
        vec!["operand".to_string()]
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let operand = inputs.get("operand").ok_or_else(|| TaskFailure::new("missing input 'operand'"))?;
        let result = match (self.op, operand) {
            (UnOpCode::Not, v) => Value::Bool(!v.truthy()),
            (UnOpCode::Neg, Value::Int(i)) => Value::Int(-i),
            (UnOpCode::Neg, Value::Float(f)) => Value::Float(-f),
            (UnOpCode::Pos, Value::Int(i)) => Value::Int(*i),
            (UnOpCode::Pos, Value::Float(f)) => Value::Float(*f),
            (UnOpCode::Invert, Value::Int(i)) => Value::Int(!i),
            _ => {
                return Err(TaskFailure::new(format!(
                    "operator {} not supported on {operand:?}",
                    self.op.as_str()
                )))
            }
        };
        let mut out = Outputs::new();
        out.insert("value".to_string(), result);
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "op": self.op.as_str() })
    }

    fn quick(&self) -> bool {
        true
    }
}

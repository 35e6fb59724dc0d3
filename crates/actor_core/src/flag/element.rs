use crate::byml::Byml;
use crate::overrides::RuleValue;

/// One value slot of a flag payload: how it is stored in a record and how an
/// override rule value converts into it.
pub(crate) trait FlagElement: Sized + Clone {
    /// Expected node shape, for error messages.
    const SHAPE: &'static str;

    fn encode(&self) -> Byml;
    fn decode(node: &Byml) -> Option<Self>;

    /// `InitValue` and array `Values` entries. Only bools store these differently.
    fn encode_init(&self) -> Byml {
        self.encode()
    }

    fn decode_init(node: &Byml) -> Option<Self> {
        Self::decode(node)
    }

    fn from_rule(value: &RuleValue) -> Option<Self>;
}

impl FlagElement for bool {
    const SHAPE: &'static str = "bool";

    fn encode(&self) -> Byml {
        Byml::Bool(*self)
    }

    fn decode(node: &Byml) -> Option<Self> {
        node.as_bool()
    }

    fn encode_init(&self) -> Byml {
        Byml::Int(i32::from(*self))
    }

    fn decode_init(node: &Byml) -> Option<Self> {
        node.as_int().map(|v| v != 0)
    }

    fn from_rule(value: &RuleValue) -> Option<Self> {
        match value {
            RuleValue::Bool(v) => Some(*v),
            RuleValue::Int(0) => Some(false),
            RuleValue::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl FlagElement for i32 {
    const SHAPE: &'static str = "int";

    fn encode(&self) -> Byml {
        Byml::Int(*self)
    }

    fn decode(node: &Byml) -> Option<Self> {
        node.as_int()
    }

    fn from_rule(value: &RuleValue) -> Option<Self> {
        match value {
            RuleValue::Int(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FlagElement for f32 {
    const SHAPE: &'static str = "float";

    fn encode(&self) -> Byml {
        Byml::Float(*self)
    }

    fn decode(node: &Byml) -> Option<Self> {
        node.as_float()
    }

    fn from_rule(value: &RuleValue) -> Option<Self> {
        value.as_f32()
    }
}

impl FlagElement for String {
    const SHAPE: &'static str = "string";

    fn encode(&self) -> Byml {
        Byml::String(self.clone())
    }

    fn decode(node: &Byml) -> Option<Self> {
        node.as_str().map(str::to_string)
    }

    fn from_rule(value: &RuleValue) -> Option<Self> {
        match value {
            RuleValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

// Vectors are wrapped once in every position: [[x, y, ...]].
impl<const N: usize> FlagElement for [f32; N] {
    const SHAPE: &'static str = "[[float; N]]";

    fn encode(&self) -> Byml {
        let inner = self.iter().map(|v| Byml::Float(*v)).collect();
        Byml::Array(vec![Byml::Array(inner)])
    }

    fn decode(node: &Byml) -> Option<Self> {
        let [inner] = node.as_array()? else {
            return None;
        };
        let components = inner.as_array()?;
        if components.len() != N {
            return None;
        }
        let mut out = [0f32; N];
        for (slot, component) in out.iter_mut().zip(components) {
            *slot = component.as_float()?;
        }
        Some(out)
    }

    fn from_rule(value: &RuleValue) -> Option<Self> {
        let RuleValue::List(items) = value else {
            return None;
        };
        if items.len() != N {
            return None;
        }
        let mut out = [0f32; N];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.as_f32()?;
        }
        Some(out)
    }
}

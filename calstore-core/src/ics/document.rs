//! Owned iCalendar property tree.

/// Component name of a primary recurring entry.
pub const PRIMARY_COMPONENT: &str = "VEVENT";

/// A content line: `NAME;PARAM=VALUE:value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    /// Parameters in document order
    pub params: Vec<(String, String)>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Property {
            name: name.into(),
            value: value.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Non-standard (`X-`) property or parameter name.
    pub fn is_extension_name(name: &str) -> bool {
        name.len() > 2 && name[..2].eq_ignore_ascii_case("X-")
    }

    pub fn is_extension(&self) -> bool {
        Self::is_extension_name(&self.name)
    }
}

/// A calendar component such as a VEVENT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Component {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn primary() -> Self {
        Component::new(PRIMARY_COMPONENT)
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.find(name).map(|p| p.value.as_str())
    }

    /// All properties with this name, in order.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// Replace the first property with this name (dropping any others), or append it.
    pub fn set(&mut self, property: Property) {
        match self
            .properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(&property.name))
        {
            Some(pos) => {
                let name = property.name.clone();
                self.properties[pos] = property;
                let mut seen = false;
                self.properties.retain(|p| {
                    if !p.name.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.properties.push(property),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }
}

/// A VCALENDAR: calendar-level properties plus primary components.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_str())
    }

    /// Replace or append a calendar-level property.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value,
            None => self.properties.push(Property::new(name, value)),
        }
    }

    /// Primary (VEVENT) components.
    pub fn primaries(&self) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case(PRIMARY_COMPONENT))
    }
}

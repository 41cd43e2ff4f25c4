/// Named backends in preference order; the first entry is the default.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        let wanted = name.trim();
        self.providers
            .iter()
            .find(|provider| provider.name().eq_ignore_ascii_case(wanted))
    }

    pub fn default_provider(&self) -> Option<&T> {
        self.providers.first()
    }

    /// Looks up `name`, or the default when no name was requested.
    pub fn resolve(&self, name: Option<&str>) -> Result<&T, String> {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            Some(requested) => self.get(requested).ok_or_else(|| {
                format!(
                    "Unknown provider '{requested}'. Available: {}",
                    self.list().join(", ")
                )
            }),
            None => self
                .default_provider()
                .ok_or_else(|| "No providers registered.".to_string()),
        }
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}

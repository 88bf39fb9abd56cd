use super::AuthMethod;
use crate::error::socks::SocksError;

#[derive(Debug, Clone)]
pub struct SocksConfig {
    pub methods: Vec<AuthMethod>,
}

impl SocksConfig {
    pub(super) fn greeting(&self) -> Result<Vec<u8>, SocksError> {
        if self.methods.is_empty() {
            return Err(SocksError::MethodNotProvided);
        }
        let count = u8::try_from(self.methods.len()).map_err(|_| SocksError::TooManyMethods)?;
        let mut greeting = Vec::with_capacity(self.methods.len() + 2);
        greeting.extend([super::VERSION, count]);
        greeting.extend(self.methods.iter().map(|m| u8::from(*m)));
        Ok(greeting)
    }

    pub(super) fn offers(&self, method: AuthMethod) -> bool {
        self.methods.contains(&method)
    }
}

impl Default for SocksConfig {
    fn default() -> Self {
        SocksConfig {
            methods: vec![AuthMethod::NoAuth],
        }
    }
}

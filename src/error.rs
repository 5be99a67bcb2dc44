use thiserror::Error;

/// Errores del dominio musical.
///
/// El texto de `Display` es el mensaje que ve el usuario: los errores de
/// resolución y de conexión vuelven al comando que los provocó, los de
/// preparación se entregan de forma asíncrona al canal del sistema.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("La consulta proporcionada está vacía.")]
    EmptyQuery,

    #[error("El tipo de elemento '{kind}' de {service} no está soportado.")]
    UnsupportedItemType { service: &'static str, kind: String },

    #[error("{0}")]
    ResolutionFailed(String),

    #[error("No tengo permiso para unirme a ese canal de voz.")]
    ConnectionDenied,

    #[error("No se pudo conectar al canal de voz: {0}")]
    ConnectionFailed(String),

    #[error("No se pudo preparar la reproducción: {0}")]
    PlaybackPreparationFailed(String),

    #[error("No hay una conexión de voz activa.")]
    NotConnected,
}

impl MusicError {
    pub fn resolution(reason: impl Into<String>) -> Self {
        Self::ResolutionFailed(reason.into())
    }

    pub fn preparation(reason: impl std::fmt::Display) -> Self {
        Self::PlaybackPreparationFailed(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_facing() {
        assert_eq!(
            MusicError::resolution("No hay resultados.").to_string(),
            "No hay resultados."
        );
        assert_eq!(
            MusicError::UnsupportedItemType {
                service: "Spotify",
                kind: "artist".into()
            }
            .to_string(),
            "El tipo de elemento 'artist' de Spotify no está soportado."
        );
        assert!(MusicError::preparation("sin formato")
            .to_string()
            .ends_with("sin formato"));
    }
}

use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use crate::audio::player::{GuildPlayer, PlayerDeps};

/// Un reproductor por guild, creado bajo demanda
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    deps: PlayerDeps,
}

impl PlayerRegistry {
    pub fn new(deps: PlayerDeps) -> Self {
        Self {
            players: DashMap::new(),
            deps,
        }
    }

    /// Devuelve el reproductor del guild, creándolo (y su bucle) la primera vez
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildPlayer> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Nuevo reproductor para guild {}", guild_id);
                GuildPlayer::spawn(guild_id, self.deps.clone())
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Detiene todos los bucles y libera sus conexiones
    pub async fn teardown_all(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|entry| *entry.key()).collect();
        let players: Vec<Arc<GuildPlayer>> = guilds
            .into_iter()
            .filter_map(|guild_id| self.players.remove(&guild_id).map(|(_, player)| player))
            .collect();

        info!("🧹 Cerrando {} reproductor(es)", players.len());
        join_all(players.iter().map(|player| player.teardown())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::{MockPlaybackErrorSink, DEFAULT_VOLUME};
    use crate::audio::voice::MockVoiceConnector;
    use crate::sources::MockPlaybackSourceProvider;

    fn registry() -> PlayerRegistry {
        PlayerRegistry::new(PlayerDeps {
            connector: Arc::new(MockVoiceConnector::new()),
            provider: Arc::new(MockPlaybackSourceProvider::new()),
            errors: Arc::new(MockPlaybackErrorSink::new()),
            default_volume: DEFAULT_VOLUME,
        })
    }

    #[tokio::test]
    async fn test_one_player_per_guild() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1));
        let again = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(2));

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(GuildId::new(3)).is_none());

        registry.teardown_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_players_keep_independent_state() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(2));

        a.set_volume(1.5);
        assert_eq!(b.volume(), DEFAULT_VOLUME);
        registry.teardown_all().await;
    }
}

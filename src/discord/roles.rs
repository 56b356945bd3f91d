//! Applying computed role holders to a guild.

use std::collections::HashSet;

use serenity::model::id::{GuildId, RoleId as DiscordRoleId, UserId};
use serenity::prelude::*;
use tracing::{debug, info, warn};

use crate::chain::RoleSync;
use crate::common::PlayerId;

const AUDIT_REASON: &str = "Word chain role sync";

/// Members to give the role to and members to take it from.
pub fn diff_holders(current: &HashSet<PlayerId>, desired: &[PlayerId]) -> (Vec<PlayerId>, Vec<PlayerId>) {
    let desired: HashSet<PlayerId> = desired.iter().copied().collect();
    let mut add: Vec<PlayerId> = desired.difference(current).copied().collect();
    let mut remove: Vec<PlayerId> = current.difference(&desired).copied().collect();
    add.sort_unstable();
    remove.sort_unstable();
    (add, remove)
}

/// Make the cached members holding `sync.role_id` match `sync.holders`.
///
/// Desired holders that are not members of the guild are skipped.
pub async fn apply_role_sync(ctx: &Context, sync: &RoleSync) -> anyhow::Result<()> {
    let guild_id = GuildId::new(sync.server_id);
    let role_id = DiscordRoleId::new(sync.role_id);

    let (current, members) = {
        let Some(guild) = ctx.cache.guild(guild_id) else {
            debug!(server_id = sync.server_id, "Guild not cached, skipping role sync");
            return Ok(());
        };
        let current: HashSet<PlayerId> = guild
            .members
            .values()
            .filter(|member| member.roles.contains(&role_id))
            .map(|member| member.user.id.get())
            .collect();
        let members: HashSet<PlayerId> = guild.members.keys().map(|id| id.get()).collect();
        (current, members)
    };

    let desired: Vec<PlayerId> = sync
        .holders
        .iter()
        .copied()
        .filter(|id| members.contains(id))
        .collect();
    let (add, remove) = diff_holders(&current, &desired);
    if add.is_empty() && remove.is_empty() {
        return Ok(());
    }

    for member in &add {
        if let Err(e) = ctx
            .http
            .add_member_role(guild_id, UserId::new(*member), role_id, Some(AUDIT_REASON))
            .await
        {
            warn!(server_id = sync.server_id, member, "Failed to add {}: {}", sync.kind, e);
        }
    }
    for member in &remove {
        if let Err(e) = ctx
            .http
            .remove_member_role(guild_id, UserId::new(*member), role_id, Some(AUDIT_REASON))
            .await
        {
            warn!(server_id = sync.server_id, member, "Failed to remove {}: {}", sync.kind, e);
        }
    }
    info!(
        server_id = sync.server_id,
        added = add.len(),
        removed = remove.len(),
        "Synchronised {}",
        sync.kind
    );
    Ok(())
}

//! Tunnels and bridges.
//!
//! A tunnel entrance keeps its `m5` high nibble zero, the transport type in
//! bits 3..2 and the facing edge in bits 1..0. Bridge ramps use `0x8t`,
//! bridge middle parts `0xCt`. Tunnel bodies are ordinary terrain; a vehicle
//! inside one is hidden and only the two portals exist as tiles.

use tycmap::{DiagDirection, Grid, Owner, TileIndex, TileKind};

use crate::rail::RailType;
use crate::status::TransportType;

pub fn is_tunnel_bridge(grid: &Grid, tile: TileIndex) -> bool {
    grid.is_kind(tile, TileKind::TunnelBridge)
}

pub fn is_tunnel_entrance(grid: &Grid, tile: TileIndex) -> bool {
    is_tunnel_bridge(grid, tile) && grid.m5(tile) & 0xF0 == 0
}

pub fn is_bridge_ramp(grid: &Grid, tile: TileIndex) -> bool {
    is_tunnel_bridge(grid, tile) && grid.m5(tile) & 0xF0 == 0x80
}

pub fn is_bridge_middle(grid: &Grid, tile: TileIndex) -> bool {
    is_tunnel_bridge(grid, tile) && grid.m5(tile) & 0xF0 == 0xC0
}

/// The edge this tunnel mouth faces, i.e. the direction a vehicle travels
/// when it dives in.
pub fn tunnel_dir(grid: &Grid, tile: TileIndex) -> DiagDirection {
    debug_assert!(is_tunnel_entrance(grid, tile));
    DiagDirection::from_u8(grid.m5(tile) & 0x03).unwrap()
}

pub fn tunnel_transport(grid: &Grid, tile: TileIndex) -> TransportType {
    debug_assert!(is_tunnel_entrance(grid, tile));
    TransportType::from_u8((grid.m5(tile) >> 2) & 0x03)
        .expect("corrupt tunnel transport type")
}

pub fn bridge_ramp_dir(grid: &Grid, tile: TileIndex) -> DiagDirection {
    debug_assert!(is_bridge_ramp(grid, tile));
    DiagDirection::from_u8(grid.m5(tile) & 0x03).unwrap()
}

pub fn bridge_transport(grid: &Grid, tile: TileIndex) -> TransportType {
    debug_assert!(is_bridge_ramp(grid, tile) || is_bridge_middle(grid, tile));
    TransportType::from_u8((grid.m5(tile) >> 2) & 0x03)
        .expect("corrupt bridge transport type")
}

/// True when the bridge middle part runs along the y axis.
pub fn bridge_axis_y(grid: &Grid, tile: TileIndex) -> bool {
    debug_assert!(is_bridge_middle(grid, tile));
    grid.m5(tile) & 0x01 != 0
}

/// Is this tunnel entrance facing `dir` and usable by `transport`?
pub fn is_tunnel_in_dir(
    grid: &Grid,
    tile: TileIndex,
    transport: TransportType,
    dir: DiagDirection,
) -> bool {
    is_tunnel_entrance(grid, tile)
        && tunnel_transport(grid, tile) == transport
        && tunnel_dir(grid, tile) == dir
}

pub fn make_tunnel(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    transport: TransportType,
    dir: DiagDirection,
    rt: RailType,
) {
    grid.set_kind(tile, TileKind::TunnelBridge);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, rt as u8);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, ((transport as u8) << 2) | dir as u8);
}

pub fn make_bridge_ramp(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    transport: TransportType,
    dir: DiagDirection,
    rt: RailType,
) {
    grid.set_kind(tile, TileKind::TunnelBridge);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, rt as u8);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, 0x80 | ((transport as u8) << 2) | dir as u8);
}

pub fn make_bridge_middle(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    transport: TransportType,
    axis_y: bool,
    rt: RailType,
) {
    grid.set_kind(tile, TileKind::TunnelBridge);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, rt as u8);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, 0xC0 | ((transport as u8) << 2) | axis_y as u8);
}

/// Where a tunnel entered at `tile` towards `dir` comes out, and how many
/// tiles the jump spans.
///
/// The body is skipped in O(length): we walk straight until the matching
/// portal at the same height appears.
pub fn find_length_of_tunnel(
    grid: &Grid,
    tile: TileIndex,
    dir: DiagDirection,
) -> (TileIndex, u32) {
    debug_assert!(is_tunnel_entrance(grid, tile));
    let z = grid.tile_z(tile);
    let mut cur = tile;
    let mut length = 0;
    loop {
        cur = grid
            .neighbour(cur, dir)
            .unwrap_or_else(|| panic!("tunnel at {:?} has no far portal", tile));
        length += 1;
        if is_tunnel_entrance(grid, cur)
            && tunnel_dir(grid, cur) == dir.reverse()
            && grid.tile_z(cur) == z
        {
            return (cur, length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_length_finds_the_far_portal() {
        let mut grid = Grid::new(6, 6);
        let a = grid.tile_xy(5, 5);
        let b = grid.tile_xy(10, 5);
        make_tunnel(
            &mut grid,
            a,
            Owner::Player(0),
            TransportType::Rail,
            DiagDirection::SW,
            RailType::Rail,
        );
        make_tunnel(
            &mut grid,
            b,
            Owner::Player(0),
            TransportType::Rail,
            DiagDirection::NE,
            RailType::Rail,
        );
        let (far, len) = find_length_of_tunnel(&grid, a, DiagDirection::SW);
        assert_eq!(far, b);
        assert_eq!(len, 5);
        let (back, len2) = find_length_of_tunnel(&grid, b, DiagDirection::NE);
        assert_eq!(back, a);
        assert_eq!(len2, 5);
    }
}

//! Pure text templating for the join/bootstrap scripts served to new hosts.
//!
//! No dynamic logic beyond substitution of the token and leader address —
//! the scripts are meant to be piped straight into a shell.

/// POSIX `sh` script that assumes the VPN is already connected: registers
/// this host with the leader and starts the agent container.
#[must_use]
pub fn join_sh(token: &str, leader_host: &str, leader_port: u16) -> String {
    format!(
        r#"#!/bin/sh
set -eu

TOKEN="{token}"
LEADER_HOST="{leader_host}"
LEADER_PORT="{leader_port}"
HOSTNAME_VALUE="$(hostname)"
VPN_ADDRESS="$(command -v tailscale >/dev/null 2>&1 && tailscale ip -4 || echo "")"

PLATFORM="linux"
case "$(uname -s)" in
  Darwin) PLATFORM="macos" ;;
esac

BODY=$(printf '{{"token":"%s","hostname":"%s","vpn_address":"%s","platform":"%s","agent_version":"0.1.0"}}' \
  "$TOKEN" "$HOSTNAME_VALUE" "$VPN_ADDRESS" "$PLATFORM")

echo "Registering $HOSTNAME_VALUE with leader $LEADER_HOST:$LEADER_PORT..."
curl -fsSL -X POST "http://$LEADER_HOST:$LEADER_PORT/register" \
  -H 'Content-Type: application/json' \
  -d "$BODY"
"#
    )
}

/// PowerShell equivalent of [`join_sh`].
#[must_use]
pub fn join_ps1(token: &str, leader_host: &str, leader_port: u16) -> String {
    format!(
        r#"$ErrorActionPreference = "Stop"
$Token = "{token}"
$LeaderHost = "{leader_host}"
$LeaderPort = {leader_port}
$HostnameValue = $env:COMPUTERNAME
$TsExe = "$env:ProgramFiles\Tailscale\tailscale.exe"
$VpnAddress = ""
if (Test-Path $TsExe) {{
    $VpnAddress = (& $TsExe ip -4 2>$null)
}}

$Body = @{{
    token = $Token
    hostname = $HostnameValue
    vpn_address = $VpnAddress
    platform = "windows"
    agent_version = "0.1.0"
}} | ConvertTo-Json

Write-Host "Registering $HostnameValue with leader $LeaderHost`:$LeaderPort..."
Invoke-RestMethod -Method Post -Uri "http://$LeaderHost`:$LeaderPort/register" -Body $Body -ContentType "application/json"
"#
    )
}

/// Self-contained bootstrap one-liner: installs the VPN client and the
/// container runtime if missing, then pipes into [`join_sh`].
#[must_use]
pub fn bootstrap_sh(token: &str, leader_host: &str, leader_port: u16) -> String {
    format!(
        r#"#!/bin/sh
set -eu

if ! command -v docker >/dev/null 2>&1; then
  echo "Installing Docker..."
  curl -fsSL https://get.docker.com | sh
fi

if ! command -v tailscale >/dev/null 2>&1; then
  echo "Installing Tailscale..."
  curl -fsSL https://tailscale.com/install.sh | sh
fi

sudo tailscale up

curl -fsSL "http://{leader_host}:{leader_port}/join/{token}" | sh
"#
    )
}

/// PowerShell equivalent of [`bootstrap_sh`].
#[must_use]
pub fn bootstrap_ps1(token: &str, leader_host: &str, leader_port: u16) -> String {
    format!(
        r#"$ErrorActionPreference = "Stop"

if (-not (Get-Command docker -ErrorAction SilentlyContinue)) {{
    Write-Host "Please install Docker Desktop, then re-run this script."
    exit 1
}}

$TsExe = "$env:ProgramFiles\Tailscale\tailscale.exe"
if (-not (Test-Path $TsExe)) {{
    winget install -e --id Tailscale.Tailscale --accept-source-agreements --accept-package-agreements | Out-Null
    Write-Host "Tailscale installed. Log in, then re-run this script."
    exit 0
}}

& $TsExe up

Invoke-Expression (Invoke-WebRequest -Uri "http://{leader_host}:{leader_port}/join/{token}/ps1").Content
"#
    )
}
